use lyceum_store::StoreObject;
use lyceum_types::{AccountName, Authority, ChainTime, PublicKey, Tokens};

/// A named account with its three-tier authority set and balances.
///
/// `common_tokens` is the vesting stake that backs witness votes and common
/// tokens withdrawals; `balance` is the liquid currency. The withdrawal
/// fields describe the active common-tokens withdrawal schedule, with
/// `next_common_tokens_withdrawal` parked at [`ChainTime::MAX`] when no
/// schedule is running.
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub id: u64,
    pub name: AccountName,
    pub memo_key: PublicKey,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub json_metadata: String,

    pub balance: Tokens,
    pub common_tokens: Tokens,
    pub common_tokens_withdraw_rate: Tokens,
    pub next_common_tokens_withdrawal: ChainTime,
    pub withdrawn: Tokens,
    pub to_withdraw: Tokens,

    /// Account whose witness votes this account delegates to; empty when
    /// voting directly. Proxying is single-level.
    pub proxy: AccountName,
    pub witnesses_voted_for: u16,

    /// Partner account allowed to start recovery of the owner authority.
    pub recovery_account: AccountName,
    pub last_owner_update: ChainTime,
    pub created: ChainTime,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            id: 0,
            name: AccountName::new(),
            memo_key: PublicKey([0u8; 32]),
            owner: Authority::default(),
            active: Authority::default(),
            posting: Authority::default(),
            json_metadata: String::new(),
            balance: Tokens::ZERO,
            common_tokens: Tokens::ZERO,
            common_tokens_withdraw_rate: Tokens::ZERO,
            next_common_tokens_withdrawal: ChainTime::MAX,
            withdrawn: Tokens::ZERO,
            to_withdraw: Tokens::ZERO,
            proxy: AccountName::new(),
            witnesses_voted_for: 0,
            recovery_account: AccountName::new(),
            last_owner_update: ChainTime::ZERO,
            created: ChainTime::ZERO,
        }
    }
}

impl Account {
    pub fn has_withdraw_schedule(&self) -> bool {
        !self.common_tokens_withdraw_rate.is_zero()
    }
}

impl StoreObject for Account {
    const TYPE_NAME: &'static str = "account";

    fn id(&self) -> u64 {
        self.id
    }
}

/// A pending owner-authority recovery started by the recovery partner.
/// Expires unused requests after a short window.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountRecoveryRequest {
    pub id: u64,
    pub account_to_recover: AccountName,
    pub new_owner_authority: Authority,
    pub expiration: ChainTime,
}

impl StoreObject for AccountRecoveryRequest {
    const TYPE_NAME: &'static str = "account recovery request";

    fn id(&self) -> u64 {
        self.id
    }
}

/// A scheduled change of recovery partner; applied only once `effect_time`
/// passes.
#[derive(Clone, Debug, PartialEq)]
pub struct RecoveryAccountChangeRequest {
    pub id: u64,
    pub account_to_recover: AccountName,
    pub recovery_account: AccountName,
    pub effect_time: ChainTime,
}

impl StoreObject for RecoveryAccountChangeRequest {
    const TYPE_NAME: &'static str = "recovery account change request";

    fn id(&self) -> u64 {
        self.id
    }
}
