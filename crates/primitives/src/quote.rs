//! The quote model: the terms of a single peg-in-triggered call, its
//! validating constructor and its content-addressed hash.
//!
//! A quote is immutable once constructed. Everything that changes over its
//! lifetime (lifecycle status, submitted transaction references) lives
//! outside this type, keyed by the quote hash.

use std::{fmt, str::FromStr};

use alloy_primitives::{keccak256, Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bitcoin::BtcAddress;

/// Validation failures rejected at quote construction.
///
/// A [`Quote`] that exists has passed all of these checks, which is what
/// lets [`Quote::hash`] be total: hashing never fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A contract-chain address that must not be the zero address was zero.
    #[error("{0} must not be the zero address")]
    ZeroAddress(&'static str),

    /// A time window that must be positive was zero.
    #[error("{0} must be greater than zero")]
    EmptyWindow(&'static str),

    /// The required confirmation depth was zero.
    #[error("required confirmations must be greater than zero")]
    ZeroConfirmations,

    /// The agreement timestamp was zero.
    #[error("agreement timestamp must be set")]
    ZeroTimestamp,

    /// `call_on_register` was set but no call target was given.
    #[error("call-on-register quotes must name a contract address")]
    MissingCallTarget,
}

/// The raw field set of a quote, in canonical hash order.
///
/// This is the shape the serving layer and the persistence layer construct;
/// [`Quote::new`] is the only way to turn it into a [`Quote`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteParams {
    /// UTXO-chain address of the federation multisig that must receive the
    /// deposit.
    pub fed_addr: BtcAddress,

    /// Contract-chain address of the liquidity bridge contract.
    pub lbc_addr: Address,

    /// Provider's fee-payout address on the contract chain.
    pub lp_rsk_addr: Address,

    /// UTXO-chain refund destination if the flow aborts.
    pub btc_refund_addr: BtcAddress,

    /// Contract-chain refund destination if the flow aborts.
    pub rsk_refund_addr: Address,

    /// Provider-controlled UTXO-chain address tying the quote to committed
    /// collateral.
    pub lp_btc_addr: BtcAddress,

    /// Fee paid to the provider, in wei.
    pub call_fee: U256,

    /// Penalty forfeited by the provider on misbehavior, in wei.
    pub penalty_fee: U256,

    /// Destination of the user call performed on registration.
    pub contract_addr: Address,

    /// Calldata of the user call.
    pub data: Bytes,

    /// Gas limit of the user call.
    pub gas_limit: u64,

    /// Uniqueness salt distinguishing otherwise-identical quotes.
    pub nonce: i64,

    /// Value forwarded by the user call, in wei.
    pub value: U256,

    /// Unix timestamp at which the parties agreed on these terms.
    pub agreement_timestamp: u32,

    /// Seconds after the agreement during which the deposit must confirm.
    pub time_for_deposit: u32,

    /// Seconds allowed for the contract-chain call to complete.
    pub call_time: u32,

    /// Required UTXO-chain confirmation depth before registration.
    pub confirmations: u16,

    /// Whether registration must atomically perform the user call.
    pub call_on_register: bool,
}

/// A validated, immutable transfer commitment.
///
/// Field order is the canonical hash order; see [`Quote::hash`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    fed_addr: BtcAddress,
    lbc_addr: Address,
    lp_rsk_addr: Address,
    btc_refund_addr: BtcAddress,
    rsk_refund_addr: Address,
    lp_btc_addr: BtcAddress,
    call_fee: U256,
    penalty_fee: U256,
    contract_addr: Address,
    data: Bytes,
    gas_limit: u64,
    nonce: i64,
    value: U256,
    agreement_timestamp: u32,
    time_for_deposit: u32,
    call_time: u32,
    confirmations: u16,
    call_on_register: bool,
}

impl Quote {
    /// Validates the raw field set and constructs a quote.
    ///
    /// Malformed terms are rejected here, before anything is hashed or
    /// persisted.
    pub fn new(params: QuoteParams) -> Result<Self, ValidationError> {
        if params.lbc_addr == Address::ZERO {
            return Err(ValidationError::ZeroAddress("lbc_addr"));
        }
        if params.lp_rsk_addr == Address::ZERO {
            return Err(ValidationError::ZeroAddress("lp_rsk_addr"));
        }
        if params.rsk_refund_addr == Address::ZERO {
            return Err(ValidationError::ZeroAddress("rsk_refund_addr"));
        }
        if params.call_on_register && params.contract_addr == Address::ZERO {
            return Err(ValidationError::MissingCallTarget);
        }
        if params.time_for_deposit == 0 {
            return Err(ValidationError::EmptyWindow("time_for_deposit"));
        }
        if params.call_time == 0 {
            return Err(ValidationError::EmptyWindow("call_time"));
        }
        if params.confirmations == 0 {
            return Err(ValidationError::ZeroConfirmations);
        }
        if params.agreement_timestamp == 0 {
            return Err(ValidationError::ZeroTimestamp);
        }

        Ok(Self {
            fed_addr: params.fed_addr,
            lbc_addr: params.lbc_addr,
            lp_rsk_addr: params.lp_rsk_addr,
            btc_refund_addr: params.btc_refund_addr,
            rsk_refund_addr: params.rsk_refund_addr,
            lp_btc_addr: params.lp_btc_addr,
            call_fee: params.call_fee,
            penalty_fee: params.penalty_fee,
            contract_addr: params.contract_addr,
            data: params.data,
            gas_limit: params.gas_limit,
            nonce: params.nonce,
            value: params.value,
            agreement_timestamp: params.agreement_timestamp,
            time_for_deposit: params.time_for_deposit,
            call_time: params.call_time,
            confirmations: params.confirmations,
            call_on_register: params.call_on_register,
        })
    }

    /// Computes the content-addressed identifier of this quote.
    ///
    /// Every field enters the digest in declaration order, including zero
    /// and empty values, so independently computed hashes agree
    /// bit-for-bit. Variable-length fields are length-prefixed so that no
    /// two distinct field sets share an encoding.
    pub fn hash(&self) -> QuoteHash {
        let mut buf = Vec::with_capacity(256);

        encode_str(&mut buf, &self.fed_addr.canonical());
        buf.extend_from_slice(self.lbc_addr.as_slice());
        buf.extend_from_slice(self.lp_rsk_addr.as_slice());
        encode_str(&mut buf, &self.btc_refund_addr.canonical());
        buf.extend_from_slice(self.rsk_refund_addr.as_slice());
        encode_str(&mut buf, &self.lp_btc_addr.canonical());
        buf.extend_from_slice(&self.call_fee.to_be_bytes::<32>());
        buf.extend_from_slice(&self.penalty_fee.to_be_bytes::<32>());
        buf.extend_from_slice(self.contract_addr.as_slice());
        encode_bytes(&mut buf, &self.data);
        buf.extend_from_slice(&self.gas_limit.to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.value.to_be_bytes::<32>());
        buf.extend_from_slice(&self.agreement_timestamp.to_be_bytes());
        buf.extend_from_slice(&self.time_for_deposit.to_be_bytes());
        buf.extend_from_slice(&self.call_time.to_be_bytes());
        buf.extend_from_slice(&self.confirmations.to_be_bytes());
        buf.push(u8::from(self.call_on_register));

        QuoteHash(keccak256(&buf).0)
    }

    /// Absolute unix deadline by which the whole flow (deposit plus call)
    /// must have completed.
    pub fn expiry_timestamp(&self) -> u64 {
        u64::from(self.agreement_timestamp)
            + u64::from(self.time_for_deposit)
            + u64::from(self.call_time)
    }

    /// Federation multisig deposit address.
    pub const fn fed_addr(&self) -> &BtcAddress {
        &self.fed_addr
    }

    /// Liquidity bridge contract address.
    pub const fn lbc_addr(&self) -> Address {
        self.lbc_addr
    }

    /// Provider fee-payout address on the contract chain.
    pub const fn lp_rsk_addr(&self) -> Address {
        self.lp_rsk_addr
    }

    /// UTXO-chain refund destination.
    pub const fn btc_refund_addr(&self) -> &BtcAddress {
        &self.btc_refund_addr
    }

    /// Contract-chain refund destination.
    pub const fn rsk_refund_addr(&self) -> Address {
        self.rsk_refund_addr
    }

    /// Provider-controlled UTXO-chain collateral address.
    pub const fn lp_btc_addr(&self) -> &BtcAddress {
        &self.lp_btc_addr
    }

    /// Provider fee in wei.
    pub const fn call_fee(&self) -> U256 {
        self.call_fee
    }

    /// Penalty amount in wei.
    pub const fn penalty_fee(&self) -> U256 {
        self.penalty_fee
    }

    /// User call destination.
    pub const fn contract_addr(&self) -> Address {
        self.contract_addr
    }

    /// User call calldata.
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// User call gas limit.
    pub const fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Uniqueness salt.
    pub const fn nonce(&self) -> i64 {
        self.nonce
    }

    /// User call value in wei.
    pub const fn value(&self) -> U256 {
        self.value
    }

    /// Unix timestamp of the agreement.
    pub const fn agreement_timestamp(&self) -> u32 {
        self.agreement_timestamp
    }

    /// Deposit window in seconds.
    pub const fn time_for_deposit(&self) -> u32 {
        self.time_for_deposit
    }

    /// Call window in seconds.
    pub const fn call_time(&self) -> u32 {
        self.call_time
    }

    /// Required UTXO-chain confirmation depth.
    pub const fn confirmations(&self) -> u16 {
        self.confirmations
    }

    /// Whether registration performs the user call atomically.
    pub const fn call_on_register(&self) -> bool {
        self.call_on_register
    }
}

fn encode_str(buf: &mut Vec<u8>, s: &str) {
    encode_bytes(buf, s.as_bytes());
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    let len = u32::try_from(bytes.len()).expect("field length fits in u32");
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// The deterministic digest identifying a quote.
///
/// Primary key of the quote store and the correlation token the
/// counterparty publishes inside the deposit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuoteHash([u8; 32]);

impl QuoteHash {
    /// Returns the raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Reconstructs a hash from raw digest bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for QuoteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Error produced when parsing a [`QuoteHash`] from hex.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid quote hash: {0}")]
pub struct ParseQuoteHashError(String);

impl FromStr for QuoteHash {
    type Err = ParseQuoteHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| ParseQuoteHashError(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for QuoteHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for QuoteHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The quote restructured into the bridge contract's expected call layout.
///
/// A pure, deterministic transform of a [`Quote`]: UTXO-chain addresses
/// become their script pubkey bytes, everything else carries over typed.
/// No I/O happens here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuote {
    /// Script pubkey of the federation deposit address.
    pub fed_btc_address: Bytes,

    /// Liquidity bridge contract address.
    pub lbc_address: Address,

    /// Provider fee-payout address.
    pub liquidity_provider_rsk_address: Address,

    /// Script pubkey of the UTXO-chain refund address.
    pub btc_refund_address: Bytes,

    /// Contract-chain refund address.
    pub rsk_refund_address: Address,

    /// Script pubkey of the provider's UTXO-chain address.
    pub liquidity_provider_btc_address: Bytes,

    /// Provider fee in wei.
    pub call_fee: U256,

    /// Penalty amount in wei.
    pub penalty_fee: U256,

    /// User call destination.
    pub contract_address: Address,

    /// User call calldata.
    pub data: Bytes,

    /// User call gas limit.
    pub gas_limit: U256,

    /// Uniqueness salt.
    pub nonce: i64,

    /// User call value in wei.
    pub value: U256,

    /// Unix timestamp of the agreement.
    pub agreement_timestamp: u32,

    /// Deposit window in seconds.
    pub time_for_deposit: u32,

    /// Call window in seconds.
    pub call_time: u32,

    /// Required UTXO-chain confirmation depth.
    pub deposit_confirmations: u16,

    /// Whether registration performs the user call atomically.
    pub call_on_register: bool,
}

impl From<&Quote> for ParsedQuote {
    fn from(quote: &Quote) -> Self {
        Self {
            fed_btc_address: quote.fed_addr.address().script_pubkey().into_bytes().into(),
            lbc_address: quote.lbc_addr,
            liquidity_provider_rsk_address: quote.lp_rsk_addr,
            btc_refund_address: quote
                .btc_refund_addr
                .address()
                .script_pubkey()
                .into_bytes()
                .into(),
            rsk_refund_address: quote.rsk_refund_addr,
            liquidity_provider_btc_address: quote
                .lp_btc_addr
                .address()
                .script_pubkey()
                .into_bytes()
                .into(),
            call_fee: quote.call_fee,
            penalty_fee: quote.penalty_fee,
            contract_address: quote.contract_addr,
            data: quote.data.clone(),
            gas_limit: U256::from(quote.gas_limit),
            nonce: quote.nonce,
            value: quote.value,
            agreement_timestamp: quote.agreement_timestamp,
            time_for_deposit: quote.time_for_deposit,
            call_time: quote.call_time,
            deposit_confirmations: quote.confirmations,
            call_on_register: quote.call_on_register,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_params, sample_quote};

    #[test]
    fn hash_is_deterministic() {
        let a = sample_quote();
        let b = sample_quote();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn nonce_alone_changes_the_hash() {
        let base = sample_quote();
        let mut params = sample_params();
        params.nonce += 1;
        let salted = Quote::new(params).unwrap();
        assert_ne!(base.hash(), salted.hash());
    }

    #[test]
    fn every_field_is_hashed() {
        let base = sample_quote().hash();

        let mut params = sample_params();
        params.call_fee += U256::from(1);
        assert_ne!(Quote::new(params).unwrap().hash(), base);

        let mut params = sample_params();
        params.call_on_register = false;
        assert_ne!(Quote::new(params).unwrap().hash(), base);

        let mut params = sample_params();
        params.gas_limit += 1;
        assert_ne!(Quote::new(params).unwrap().hash(), base);
    }

    #[test]
    fn variable_length_fields_cannot_alias() {
        // Moving a byte across the boundary of two adjacent length-prefixed
        // fields must change the digest.
        let mut params = sample_params();
        params.data = Bytes::from(vec![0xaa, 0xbb]);
        let a = Quote::new(params).unwrap().hash();

        let mut params = sample_params();
        params.data = Bytes::from(vec![0xaa]);
        let b = Quote::new(params).unwrap().hash();

        assert_ne!(a, b);
    }

    #[test]
    fn rejects_zero_lbc_address() {
        let mut params = sample_params();
        params.lbc_addr = Address::ZERO;
        assert_eq!(
            Quote::new(params).unwrap_err(),
            ValidationError::ZeroAddress("lbc_addr")
        );
    }

    #[test]
    fn rejects_zero_deposit_window() {
        let mut params = sample_params();
        params.time_for_deposit = 0;
        assert_eq!(
            Quote::new(params).unwrap_err(),
            ValidationError::EmptyWindow("time_for_deposit")
        );
    }

    #[test]
    fn rejects_zero_confirmations() {
        let mut params = sample_params();
        params.confirmations = 0;
        assert_eq!(
            Quote::new(params).unwrap_err(),
            ValidationError::ZeroConfirmations
        );
    }

    #[test]
    fn rejects_call_on_register_without_target() {
        let mut params = sample_params();
        params.call_on_register = true;
        params.contract_addr = Address::ZERO;
        assert_eq!(
            Quote::new(params).unwrap_err(),
            ValidationError::MissingCallTarget
        );
    }

    #[test]
    fn allows_zero_call_target_for_plain_transfers() {
        let mut params = sample_params();
        params.call_on_register = false;
        params.contract_addr = Address::ZERO;
        params.data = Bytes::new();
        assert!(Quote::new(params).is_ok());
    }

    #[test]
    fn quote_hash_hex_round_trip() {
        let hash = sample_quote().hash();
        let rendered = hash.to_string();
        assert_eq!(rendered.len(), 64);
        assert_eq!(rendered.parse::<QuoteHash>().unwrap(), hash);
    }

    #[test]
    fn parsed_quote_is_deterministic() {
        let quote = sample_quote();
        assert_eq!(ParsedQuote::from(&quote), ParsedQuote::from(&quote));
    }

    #[test]
    fn parsed_quote_renders_script_pubkeys() {
        let quote = sample_quote();
        let parsed = ParsedQuote::from(&quote);
        assert!(!parsed.fed_btc_address.is_empty());
        assert_eq!(parsed.gas_limit, U256::from(quote.gas_limit()));
    }

    #[test]
    fn expiry_covers_both_windows() {
        let quote = sample_quote();
        assert_eq!(
            quote.expiry_timestamp(),
            u64::from(quote.agreement_timestamp())
                + u64::from(quote.time_for_deposit())
                + u64::from(quote.call_time())
        );
    }
}
