#![allow(dead_code)]

use alloy::{json_abi::JsonAbi, primitives::Address};
use eth_history::{EthHistory, test_utils::MockNode};
use tracing_subscriber::EnvFilter;

pub const CONTRACT: Address = Address::repeat_byte(0xAA);

pub const TRANSFER_ABI: &str = r#"[{
    "type": "event",
    "name": "Transfer",
    "anonymous": false,
    "inputs": [
        {"name": "from", "type": "address", "indexed": true},
        {"name": "to", "type": "address", "indexed": true},
        {"name": "value", "type": "uint256", "indexed": false}
    ]
}]"#;

pub const BALANCE_OF_ABI: &str = r#"[{
    "type": "function",
    "name": "balanceOf",
    "stateMutability": "view",
    "inputs": [{"name": "owner", "type": "address"}],
    "outputs": [{"name": "", "type": "uint256"}]
}]"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn transfer_abi() -> anyhow::Result<JsonAbi> {
    Ok(serde_json::from_str(TRANSFER_ABI)?)
}

pub fn history(node: MockNode) -> anyhow::Result<EthHistory<MockNode>> {
    init_tracing();
    Ok(EthHistory::builder(node, CONTRACT, transfer_abi()?).event_page_size(10).build()?)
}
