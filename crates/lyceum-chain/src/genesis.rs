//! The genesis document: the chain's complete initial condition.
//!
//! The chain id is a domain-separated digest of the canonical genesis
//! encoding, so two chains started from different documents can never
//! accept each other's signatures.

use serde::{Deserialize, Serialize};

use lyceum_types::{
    domain_digest, validate_account_name, AccountName, ChainId, ChainTime, PublicKey, Tokens,
};

use crate::constants::ChainConstants;
use crate::error::ChainError;

const CHAIN_ID_DOMAIN: &[u8] = b"lyceum-chain-v1:";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub name: AccountName,
    pub public_key: PublicKey,
    #[serde(default)]
    pub balance: Tokens,
}

/// An initial block producer; must name a genesis account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisWitness {
    pub owner: AccountName,
    pub signing_key: PublicKey,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisDiscipline {
    pub name: String,
    /// Name of the parent discipline; empty for children of the common
    /// root. Must refer to an earlier entry.
    #[serde(default)]
    pub parent: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisExpertToken {
    pub account: AccountName,
    pub discipline: String,
    pub amount: i64,
}

/// Everything a node needs to boot a chain from nothing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisState {
    pub initial_timestamp: ChainTime,
    /// Total initial currency; must equal the sum of account balances.
    pub init_supply: i64,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
    #[serde(default)]
    pub witness_candidates: Vec<GenesisWitness>,
    #[serde(default)]
    pub disciplines: Vec<GenesisDiscipline>,
    #[serde(default)]
    pub expert_tokens: Vec<GenesisExpertToken>,
    #[serde(default)]
    pub constants: ChainConstants,
}

impl GenesisState {
    pub fn from_json(json: &str) -> Result<Self, ChainError> {
        let genesis: GenesisState =
            serde_json::from_str(json).map_err(|e| ChainError::InvalidGenesis(e.to_string()))?;
        genesis.validate()?;
        Ok(genesis)
    }

    /// Domain-separated digest of the canonical genesis encoding.
    pub fn chain_id(&self) -> ChainId {
        ChainId::from_hash(domain_digest(CHAIN_ID_DOMAIN, self))
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.init_supply < 0 {
            return Err(ChainError::InvalidGenesis(
                "initial supply cannot be negative".to_string(),
            ));
        }

        let mut names = std::collections::BTreeSet::new();
        let mut distributed: i64 = 0;
        for account in &self.accounts {
            validate_account_name(&account.name)
                .map_err(|e| ChainError::InvalidGenesis(format!("account name: {e}")))?;
            if !names.insert(account.name.as_str()) {
                return Err(ChainError::InvalidGenesis(format!(
                    "duplicate account `{}`",
                    account.name
                )));
            }
            if account.balance.is_negative() {
                return Err(ChainError::InvalidGenesis(format!(
                    "account `{}` has a negative balance",
                    account.name
                )));
            }
            distributed += account.balance.amount();
        }
        if distributed != self.init_supply {
            return Err(ChainError::InvalidGenesis(format!(
                "account balances sum to {distributed}, initial supply is {}",
                self.init_supply
            )));
        }

        if self.witness_candidates.is_empty() {
            return Err(ChainError::InvalidGenesis(
                "at least one witness candidate is required".to_string(),
            ));
        }
        for witness in &self.witness_candidates {
            if !names.contains(witness.owner.as_str()) {
                return Err(ChainError::InvalidGenesis(format!(
                    "witness `{}` is not a genesis account",
                    witness.owner
                )));
            }
        }

        let mut disciplines = std::collections::BTreeSet::new();
        for discipline in &self.disciplines {
            if discipline.name.is_empty() || discipline.name == "common" {
                return Err(ChainError::InvalidGenesis(format!(
                    "invalid discipline name `{}`",
                    discipline.name
                )));
            }
            if !discipline.parent.is_empty() && !disciplines.contains(discipline.parent.as_str()) {
                return Err(ChainError::InvalidGenesis(format!(
                    "discipline `{}` names unknown parent `{}`",
                    discipline.name, discipline.parent
                )));
            }
            if !disciplines.insert(discipline.name.as_str()) {
                return Err(ChainError::InvalidGenesis(format!(
                    "duplicate discipline `{}`",
                    discipline.name
                )));
            }
        }

        for token in &self.expert_tokens {
            if !names.contains(token.account.as_str()) {
                return Err(ChainError::InvalidGenesis(format!(
                    "expert token for unknown account `{}`",
                    token.account
                )));
            }
            if !disciplines.contains(token.discipline.as_str()) {
                return Err(ChainError::InvalidGenesis(format!(
                    "expert token in unknown discipline `{}`",
                    token.discipline
                )));
            }
            if token.amount <= 0 {
                return Err(ChainError::InvalidGenesis(format!(
                    "expert token for `{}` must be positive",
                    token.account
                )));
            }
        }
        Ok(())
    }
}
