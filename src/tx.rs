use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, NameOrAddress, TransactionRequest, U256};

/// Fields of a contract call transaction that come from the chain at send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxEnvelope {
    pub nonce: U256,
    pub gas_price: U256,
    pub chain_id: u64,
}

/// Build a legacy (gas-price) contract call with zero value.
pub fn build_call_tx(
    from: Address,
    to: Address,
    data: Bytes,
    gas_limit: U256,
    envelope: TxEnvelope,
) -> TypedTransaction {
    let mut tx = TransactionRequest::new();
    tx = tx.from(from);
    tx = tx.to(NameOrAddress::Address(to));
    tx = tx.value(U256::zero());
    tx = tx.data(data);
    tx = tx.gas(gas_limit);
    tx = tx.gas_price(envelope.gas_price);
    tx = tx.nonce(envelope.nonce);
    tx = tx.chain_id(envelope.chain_id);

    TypedTransaction::Legacy(tx)
}
