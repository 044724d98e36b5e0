// SPDX-License-Identifier: Apache-2.0

//! Canned test data shared by every test case: a deterministic account
//! keyring and golden numeric values. Read-only for the process lifetime.

use crate::bignum::Big;
use crate::chain::{keccak256, Address};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::fmt;

/// The well-known test accounts. Addresses are derived from the account
/// name, so they are identical in every run and can be quoted in golden
/// expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyring {
    Alice,
    Bob,
    Charlie,
    Dave,
    Eve,
    Ferdie,
}

impl Keyring {
    pub const ALL: [Keyring; 6] = [
        Keyring::Alice,
        Keyring::Bob,
        Keyring::Charlie,
        Keyring::Dave,
        Keyring::Eve,
        Keyring::Ferdie,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Keyring::Alice => "alice",
            Keyring::Bob => "bob",
            Keyring::Charlie => "charlie",
            Keyring::Dave => "dave",
            Keyring::Eve => "eve",
            Keyring::Ferdie => "ferdie",
        }
    }

    /// The account address: the last 20 bytes of the keccak-256 digest of
    /// the account name.
    pub fn address(self) -> Address {
        let digest = keccak256(self.name().as_bytes());
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[12..]);
        Address::new(addr)
    }
}

impl fmt::Display for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Golden numeric values, embedded as a JSON document so they are available
/// the moment the module loads.
const FIXTURE_DATA: &str = r#"{
    "one_token": "1000000000000000000",
    "initial_supply": "10000000000000000000000",
    "max_uint256": "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"
}"#;

#[derive(Debug, Clone, Deserialize)]
struct RawFixtures {
    one_token: String,
    initial_supply: String,
    max_uint256: String,
}

/// Parsed golden values. Obtain through [`fixtures`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixtures {
    /// One token in its smallest unit (`10^18`).
    pub one_token: Big,
    /// The supply minted at deployment: ten thousand tokens.
    pub initial_supply: Big,
    /// The largest value a 256-bit storage word can hold.
    pub max_uint256: Big,
}

static FIXTURES: Lazy<Fixtures> = Lazy::new(|| {
    let raw: RawFixtures =
        serde_json::from_str(FIXTURE_DATA).expect("embedded fixture data is malformed");
    let parse = |field: &str, lit: &str| -> Big {
        lit.parse().unwrap_or_else(|e| panic!("fixture '{field}' is not numeric: {e}"))
    };
    Fixtures {
        one_token: parse("one_token", &raw.one_token),
        initial_supply: parse("initial_supply", &raw.initial_supply),
        max_uint256: parse("max_uint256", &raw.max_uint256),
    }
});

static ACCOUNTS: Lazy<[Address; 6]> = Lazy::new(|| Keyring::ALL.map(Keyring::address));

/// The golden fixture values, parsed once at first access.
pub fn fixtures() -> &'static Fixtures {
    &FIXTURES
}

/// The keyring account addresses, in keyring order.
pub fn accounts() -> &'static [Address; 6] {
    &ACCOUNTS
}
