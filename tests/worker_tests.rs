//! Chain worker: ordered submissions over the command channel

mod common;

use common::{mine_block, transfer, wallet};
use vulkan_core::chain::{BlockStatus, ChainManager};
use vulkan_core::constants::COIN;
use vulkan_core::error::ChainError;
use vulkan_core::genesis::genesis_block;
use vulkan_core::store::MemoryStore;
use vulkan_core::types::OutPoint;
use vulkan_core::worker::spawn;

#[test]
fn worker_processes_submissions_in_order() {
    let manager = ChainManager::new(MemoryStore::new()).unwrap();
    let (handle, thread) = spawn(manager);

    let (key_a, addr_a) = wallet();
    let (_, addr_b) = wallet();

    let b1 = mine_block(&genesis_block(), 1, addr_a, vec![], 0);
    let funding = OutPoint::new(b1.transactions[0].id, 0);

    assert_eq!(handle.submit_block(b1.clone()).unwrap(), BlockStatus::Connected);
    assert_eq!(handle.tip().unwrap(), (b1.hash, 1));

    let pending = transfer(&key_a, funding, &[(addr_b, 49 * COIN)]);
    handle.submit_transaction(pending).unwrap();
    assert_eq!(handle.mempool_size().unwrap(), 1);

    let utxo = handle.utxo(funding).unwrap().unwrap();
    assert_eq!(utxo.amount, 50 * COIN);

    handle.shutdown().unwrap();
    thread.join().unwrap();
}

#[test]
fn worker_reports_validation_failures() {
    let manager = ChainManager::new(MemoryStore::new()).unwrap();
    let (handle, thread) = spawn(manager);

    let (_, miner) = wallet();
    let mut tampered = mine_block(&genesis_block(), 1, miner, vec![], 0);
    tampered.hash[0] ^= 0x01;

    assert!(matches!(
        handle.submit_block(tampered),
        Err(ChainError::InvalidBlock(_))
    ));
    assert_eq!(handle.tip().unwrap(), (genesis_block().hash, 0));

    handle.shutdown().unwrap();
    thread.join().unwrap();
}

#[test]
fn handle_fails_cleanly_after_shutdown() {
    let manager = ChainManager::new(MemoryStore::new()).unwrap();
    let (handle, thread) = spawn(manager);

    handle.shutdown().unwrap();
    thread.join().unwrap();

    assert!(matches!(handle.tip(), Err(ChainError::ChannelClosed)));
}
