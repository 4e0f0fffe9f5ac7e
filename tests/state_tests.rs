//! State-machine properties: reorganized state equals replayed state, and
//! the chain survives a restart

mod common;

use common::{mine_block, transfer, wallet};
use vulkan_core::chain::{BlockStatus, ChainManager};
use vulkan_core::constants::COIN;
use vulkan_core::genesis::genesis_block;
use vulkan_core::store::{MemoryStore, SledStore};
use vulkan_core::types::OutPoint;

#[test]
fn reorganized_state_equals_replayed_state() {
    let (key_a, addr_a) = wallet();
    let (_, addr_b) = wallet();
    let (_, addr_m1) = wallet();
    let (_, addr_m2) = wallet();

    let genesis = genesis_block();
    let b1 = mine_block(&genesis, 1, addr_a, vec![], 0);
    let funding = OutPoint::new(b1.transactions[0].id, 0);

    let spend = transfer(&key_a, funding, &[(addr_b, 50 * COIN)]);
    let b2 = mine_block(&b1, 2, addr_m1, vec![spend], 0);

    let b2_alt = mine_block(&b1, 2, addr_m2, vec![], 0);
    let b3_alt = mine_block(&b2_alt, 3, addr_m2, vec![], 0);

    // chain one goes through the detour branch and reorganizes
    let mut detoured = ChainManager::new(MemoryStore::new()).unwrap();
    detoured.submit_block(b1.clone()).unwrap();
    detoured.submit_block(b2).unwrap();
    detoured.submit_block(b2_alt.clone()).unwrap();
    assert!(matches!(
        detoured.submit_block(b3_alt.clone()).unwrap(),
        BlockStatus::Reorganized { .. }
    ));

    // chain two applies the winning branch directly
    let mut direct = ChainManager::new(MemoryStore::new()).unwrap();
    direct.submit_block(b1).unwrap();
    direct.submit_block(b2_alt).unwrap();
    direct.submit_block(b3_alt).unwrap();

    assert_eq!(detoured.tip(), direct.tip());
    assert_eq!(detoured.height(), direct.height());
    assert_eq!(
        detoured.utxo_entries().unwrap(),
        direct.utxo_entries().unwrap()
    );
}

#[test]
fn deep_reorganization_rewinds_several_blocks() {
    let (_, addr_m1) = wallet();
    let (_, addr_m2) = wallet();

    let genesis = genesis_block();
    let a1 = mine_block(&genesis, 1, addr_m1, vec![], 0);
    let a2 = mine_block(&a1, 2, addr_m1, vec![], 0);
    let a3 = mine_block(&a2, 3, addr_m1, vec![], 0);

    let b1 = mine_block(&genesis, 1, addr_m2, vec![], 0);
    let b2 = mine_block(&b1, 2, addr_m2, vec![], 0);
    let b3 = mine_block(&b2, 3, addr_m2, vec![], 0);
    let b4 = mine_block(&b3, 4, addr_m2, vec![], 0);

    let mut chain = ChainManager::new(MemoryStore::new()).unwrap();
    for block in [a1, a2, a3] {
        chain.submit_block(block).unwrap();
    }
    for block in [b1, b2, b3.clone()] {
        let status = chain.submit_block(block).unwrap();
        assert!(matches!(
            status,
            BlockStatus::SideChain | BlockStatus::Orphaned
        ));
    }
    assert_eq!(chain.height(), 3);

    let status = chain.submit_block(b4.clone()).unwrap();
    assert_eq!(
        status,
        BlockStatus::Reorganized {
            disconnected: 3,
            connected: 4,
        }
    );
    assert_eq!(chain.tip(), b4.hash);
    assert_eq!(chain.height(), 4);
}

#[test]
fn chain_and_mempool_survive_restart() {
    let (key_a, addr_a) = wallet();
    let (_, addr_b) = wallet();

    let b1 = mine_block(&genesis_block(), 1, addr_a, vec![], 0);
    let funding = OutPoint::new(b1.transactions[0].id, 0);
    let pending = transfer(&key_a, funding, &[(addr_b, 49 * COIN)]);

    let store = {
        let mut chain = ChainManager::new(MemoryStore::new()).unwrap();
        chain.submit_block(b1.clone()).unwrap();
        chain.submit_transaction(pending.clone()).unwrap();
        chain.into_store()
    };

    let reopened = ChainManager::new(store).unwrap();
    assert_eq!(reopened.tip(), b1.hash);
    assert_eq!(reopened.height(), 1);
    assert!(reopened.mempool().contains(&pending.id));
}

#[test]
fn sled_backend_round_trips_the_chain() {
    let path = std::env::temp_dir().join(format!("vulkan-core-sled-test-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&path);

    let (_, miner) = wallet();
    let b1 = mine_block(&genesis_block(), 1, miner, vec![], 0);

    {
        let store = SledStore::open(&path).unwrap();
        let mut chain = ChainManager::new(store).unwrap();
        chain.submit_block(b1.clone()).unwrap();
    }
    {
        let store = SledStore::open(&path).unwrap();
        let chain = ChainManager::new(store).unwrap();
        assert_eq!(chain.tip(), b1.hash);
        assert_eq!(chain.height(), 1);
    }

    let _ = std::fs::remove_dir_all(&path);
}
