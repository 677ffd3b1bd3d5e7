//! Deployment definitions for the supported networks
//!
//! Each network carries its own reward token, router, sugar view and
//! relay registry. Relays listed in `excluded_relays` are foundation-owned
//! and must never swap the native reward token away.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================
// OPTIMISM (Velodrome)
// ============================================

pub const VELO: Address = address!("9560e827aF36c94D2Ac33a39bCE1Fe78631088Db");
pub const OP_LP_SUGAR: Address = address!("6eDCAb198EAdDBDA3865f813A83F6bC9012F16e9");
pub const OP_ROUTER: Address = address!("a062aE8A9c5e11aaA026fc2670B0D65cCc8B2858");
pub const OP_RELAY_REGISTRY: Address = address!("6b1253B116B5919932399295C75116d33F8EfF96");
pub const OP_LIBRARY: Address = address!("253CA289Cd921ba4a18C053C00a80c9660D508f8");
pub const OP_EXCLUDED_RELAYS: [Address; 1] =
    [address!("00621858D5Dc273FCF204260265bA6E66C34b5E7")];

// ============================================
// BASE (Aerodrome)
// ============================================

pub const AERO: Address = address!("940181a94A35A4569E4529A3CDfB74e38FD98631");
pub const BASE_LP_SUGAR: Address = address!("2073D8035bB2b0F2e85aAF5a8732C6f397F9ff9b");
pub const BASE_ROUTER: Address = address!("cF77a3Ba9A5CA399B7c97c74d54e5b1Beb874E43");
pub const BASE_RELAY_REGISTRY: Address = address!("D308aBCe663302d3b86b36d332CEFd8A4F62C5Ed");
pub const BASE_EXCLUDED_RELAYS: [Address; 3] = [
    address!("48A6a8D403a58ecCc70d4d57347F801D4E182564"),
    address!("C875b3Dae5B0C371bc8cf9deD64868b78ac47587"),
    address!("6a941fE89Cac5f440bb14e5286AD3E38ca3F2d39"),
];

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Network {
    #[default]
    Optimism,
    Base,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Optimism => write!(f, "Optimism"),
            Network::Base => write!(f, "Base"),
        }
    }
}

impl FromStr for Network {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimism" | "op" | "10" => Ok(Network::Optimism),
            "base" | "8453" => Ok(Network::Base),
            other => Err(eyre::eyre!("Unknown network: {}", other)),
        }
    }
}

/// Addresses and routing limits of one protocol deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub network: Network,
    /// Native reward token; relays targeting it are auto-compounders
    pub reward_token: Address,
    pub reward_symbol: String,
    pub lp_sugar: Address,
    pub router: Address,
    pub relay_registry: Address,
    /// Trade-diff library used for price impact. `None` disables the check.
    pub library: Option<Address>,
    pub excluded_relays: Vec<Address>,
    pub max_hops: usize,
    pub max_routes: usize,
}

impl Deployment {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Optimism => Self {
                network,
                reward_token: VELO,
                reward_symbol: "VELO".to_string(),
                lp_sugar: OP_LP_SUGAR,
                router: OP_ROUTER,
                relay_registry: OP_RELAY_REGISTRY,
                library: Some(OP_LIBRARY),
                excluded_relays: OP_EXCLUDED_RELAYS.to_vec(),
                max_hops: 2,
                max_routes: 25,
            },
            Network::Base => Self {
                network,
                reward_token: AERO,
                reward_symbol: "AERO".to_string(),
                lp_sugar: BASE_LP_SUGAR,
                router: BASE_ROUTER,
                relay_registry: BASE_RELAY_REGISTRY,
                library: None,
                excluded_relays: BASE_EXCLUDED_RELAYS.to_vec(),
                max_hops: 3,
                max_routes: 50,
            },
        }
    }

    /// Foundation relays keep their native reward token
    pub fn is_excluded_relay(&self, relay: Address) -> bool {
        self.excluded_relays.contains(&relay)
    }
}

impl Default for Deployment {
    fn default() -> Self {
        Self::for_network(Network::Optimism)
    }
}
