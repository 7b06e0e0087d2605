//! Conversions from `alloy` primitives into the `ethereum-types` primitives
//! used by the encoders and the trie.

use ethereum_types::{Bloom, H160, H256, U256};

pub trait Compat<Out> {
    fn compat(self) -> Out;
}

impl Compat<H160> for alloy::primitives::Address {
    fn compat(self) -> H160 {
        let alloy::primitives::Address(alloy::primitives::FixedBytes(arr)) = self;
        H160(arr)
    }
}

impl Compat<H256> for alloy::primitives::B256 {
    fn compat(self) -> H256 {
        let alloy::primitives::FixedBytes(arr) = self;
        H256(arr)
    }
}

impl Compat<Bloom> for alloy::primitives::Bloom {
    fn compat(self) -> Bloom {
        let alloy::primitives::Bloom(alloy::primitives::FixedBytes(arr)) = self;
        Bloom(arr)
    }
}

impl Compat<U256> for alloy::primitives::U256 {
    fn compat(self) -> U256 {
        // Both store little endian 64 bit limbs.
        U256(self.into_limbs())
    }
}

impl Compat<alloy::primitives::Address> for H160 {
    fn compat(self) -> alloy::primitives::Address {
        let H160(arr) = self;
        alloy::primitives::Address(alloy::primitives::FixedBytes(arr))
    }
}

impl Compat<alloy::primitives::B256> for H256 {
    fn compat(self) -> alloy::primitives::B256 {
        let H256(arr) = self;
        alloy::primitives::FixedBytes(arr)
    }
}
