//! Deterministic fixtures shared by tests across the workspace.

use alloy_primitives::{Address, Bytes, U256};
use bitcoin::{
    absolute::LockTime, consensus, hashes::Hash, transaction::Version, Amount, Network,
    ScriptHash, Transaction, TxOut,
};
use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::{
    bitcoin::BtcAddress,
    deposit::DepositProof,
    quote::{Quote, QuoteParams},
    types::BitcoinBlockHeight,
};

/// A deterministic P2SH address derived from a one-byte tag.
pub fn btc_addr(tag: u8) -> BtcAddress {
    let script_hash =
        ScriptHash::from_slice(&[tag; 20]).expect("must have right number of bytes");
    let address = bitcoin::Address::p2sh_from_hash(script_hash, Network::Bitcoin);
    BtcAddress::parse(&address.to_string(), Network::Bitcoin)
        .expect("derived address must parse")
}

/// The federation deposit address used throughout the tests.
pub fn fed_address() -> BtcAddress {
    btc_addr(0xfe)
}

/// `n` deterministic federation public keys.
pub fn fed_keys(n: usize) -> Vec<PublicKey> {
    let secp = Secp256k1::new();
    (0..n)
        .map(|i| {
            let sk = SecretKey::from_slice(&[i as u8 + 1; 32]).expect("non-zero key material");
            PublicKey::from_secret_key(&secp, &sk)
        })
        .collect()
}

/// The canonical valid quote parameter set: value 1000 wei, fee 10 wei,
/// call-on-register set.
pub fn sample_params() -> QuoteParams {
    QuoteParams {
        fed_addr: fed_address(),
        lbc_addr: Address::repeat_byte(0x22),
        lp_rsk_addr: Address::repeat_byte(0x33),
        btc_refund_addr: btc_addr(0x44),
        rsk_refund_addr: Address::repeat_byte(0x55),
        lp_btc_addr: btc_addr(0x66),
        call_fee: U256::from(10),
        penalty_fee: U256::from(5),
        contract_addr: Address::repeat_byte(0x77),
        data: Bytes::from(vec![0xca, 0xfe]),
        gas_limit: 46_000,
        nonce: 7,
        value: U256::from(1000),
        agreement_timestamp: 4_000_000_000,
        time_for_deposit: 3_600,
        call_time: 7_200,
        confirmations: 2,
        call_on_register: true,
    }
}

/// A valid quote built from [`sample_params`].
pub fn sample_quote() -> Quote {
    Quote::new(sample_params()).expect("sample params must validate")
}

/// A valid quote with the given monetary terms and call mode.
pub fn quote_with_terms(value: u64, call_fee: u64, call_on_register: bool) -> Quote {
    let mut params = sample_params();
    params.value = U256::from(value);
    params.call_fee = U256::from(call_fee);
    params.call_on_register = call_on_register;
    Quote::new(params).expect("terms must validate")
}

/// A decodable deposit proof confirmed at the given height.
pub fn sample_deposit_proof(block_height: BitcoinBlockHeight) -> DepositProof {
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![],
        output: vec![TxOut {
            value: Amount::from_sat(50_000),
            script_pubkey: fed_address().address().script_pubkey(),
        }],
    };

    DepositProof::new(consensus::serialize(&tx), vec![0xab; 80], block_height)
        .expect("fixture proof must validate")
}
