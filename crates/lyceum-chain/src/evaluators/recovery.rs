//! Owner-authority recovery through a designated partner account.
//!
//! The partner files a request naming the replacement owner authority; the
//! account holder completes it by co-signing with an authority that still
//! matches the current owner. Switching partners takes effect only after a
//! long delay, so a thief cannot quietly cut the victim's partner out.

use lyceum_types::Operation;

use crate::database::Database;
use crate::error::{ensure, ChainError};
use crate::state::{AccountRecoveryRequest, RecoveryAccountChangeRequest};

pub(super) fn request_account_recovery(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::RequestAccountRecovery(op) = op else {
        unreachable!("dispatched by kind");
    };
    let account = db.get_account(&op.account_to_recover)?;
    ensure!(
        account.recovery_account == op.recovery_account,
        "only `{}` may request recovery of `{}`",
        account.recovery_account,
        op.account_to_recover
    );
    let expiration = db.head_block_time() + db.constants().recovery_request_expiration_secs;
    let existing = db
        .state
        .recovery_requests
        .iter()
        .find(|r| r.account_to_recover == op.account_to_recover)
        .map(|r| r.id);
    match existing {
        Some(request_id) => {
            db.state.recovery_requests.modify(request_id, |r| {
                r.new_owner_authority = op.new_owner_authority.clone();
                r.expiration = expiration;
            })?;
        }
        None => {
            db.state.recovery_requests.create(|id| AccountRecoveryRequest {
                id,
                account_to_recover: op.account_to_recover.clone(),
                new_owner_authority: op.new_owner_authority.clone(),
                expiration,
            });
        }
    }
    Ok(())
}

pub(super) fn recover_account(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::RecoverAccount(op) = op else {
        unreachable!("dispatched by kind");
    };
    let account = db.get_account(&op.account_to_recover)?;
    let last_owner_update = account.last_owner_update;
    ensure!(
        account.owner == op.recent_owner_authority,
        "recent owner authority does not match `{}`",
        op.account_to_recover
    );
    let now = db.head_block_time();
    let limit = db.constants().owner_update_limit_secs;
    ensure!(
        now.secs_since(last_owner_update) > limit,
        "owner authority of `{}` already changed within the last {limit} seconds",
        op.account_to_recover
    );

    let (request_id, requested_authority, expiration) = db
        .state
        .recovery_requests
        .iter()
        .find(|r| r.account_to_recover == op.account_to_recover)
        .map(|r| (r.id, r.new_owner_authority.clone(), r.expiration))
        .ok_or_else(|| {
            ChainError::rejected(format!(
                "no active recovery request for `{}`",
                op.account_to_recover
            ))
        })?;
    ensure!(
        now < expiration,
        "recovery request for `{}` has expired",
        op.account_to_recover
    );
    ensure!(
        requested_authority == op.new_owner_authority,
        "new owner authority does not match the recovery request"
    );

    db.modify_account(&op.account_to_recover, |a| {
        a.owner = op.new_owner_authority.clone();
        a.last_owner_update = now;
    })?;
    db.state.recovery_requests.remove(request_id)?;
    Ok(())
}

pub(super) fn change_recovery_account(db: &mut Database, op: &Operation) -> Result<(), ChainError> {
    let Operation::ChangeRecoveryAccount(op) = op else {
        unreachable!("dispatched by kind");
    };
    let current = db.get_account(&op.account_to_recover)?.recovery_account.clone();
    let pending = db
        .state
        .recovery_changes
        .iter()
        .find(|c| c.account_to_recover == op.account_to_recover)
        .map(|c| c.id);

    if op.new_recovery_account == current {
        // Naming the current partner again cancels any pending switch.
        return match pending {
            Some(change_id) => {
                db.state.recovery_changes.remove(change_id)?;
                Ok(())
            }
            None => Err(ChainError::rejected(format!(
                "`{}` is already the recovery partner of `{}`",
                op.new_recovery_account, op.account_to_recover
            ))),
        };
    }

    db.get_account(&op.new_recovery_account)?;
    let effect_time = db.head_block_time() + db.constants().recovery_account_delay_secs;
    match pending {
        Some(change_id) => {
            db.state.recovery_changes.modify(change_id, |c| {
                c.recovery_account = op.new_recovery_account.clone();
                c.effect_time = effect_time;
            })?;
        }
        None => {
            db.state
                .recovery_changes
                .create(|id| RecoveryAccountChangeRequest {
                    id,
                    account_to_recover: op.account_to_recover.clone(),
                    recovery_account: op.new_recovery_account.clone(),
                    effect_time,
                });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use lyceum_types::operations::{
        ChangeRecoveryAccount, RecoverAccount, RequestAccountRecovery,
    };
    use lyceum_types::{Authority, ChainTime, PublicKey};

    use crate::testing::dev_db;

    use super::*;

    fn key(seed: u8) -> PublicKey {
        PublicKey([seed; 32])
    }

    fn request_op(partner: &str, account: &str, new_key: u8) -> Operation {
        Operation::RequestAccountRecovery(RequestAccountRecovery {
            recovery_account: partner.into(),
            account_to_recover: account.into(),
            new_owner_authority: Authority::single_key(key(new_key)),
        })
    }

    #[test]
    fn partner_request_then_recover_replaces_the_owner() {
        let mut db = dev_db();
        db.modify_account("alice", |a| a.recovery_account = "bobby".into())
            .unwrap();
        request_account_recovery(&mut db, &request_op("bobby", "alice", 9)).unwrap();
        assert_eq!(db.state.recovery_requests.len(), 1);

        let recent = db.get_account("alice").unwrap().owner.clone();
        db.modify_global(|g| g.time = ChainTime::from_secs(3_601));
        recover_account(
            &mut db,
            &Operation::RecoverAccount(RecoverAccount {
                account_to_recover: "alice".into(),
                new_owner_authority: Authority::single_key(key(9)),
                recent_owner_authority: recent,
            }),
        )
        .unwrap();

        let alice = db.get_account("alice").unwrap();
        assert_eq!(alice.owner, Authority::single_key(key(9)));
        assert_eq!(alice.last_owner_update, ChainTime::from_secs(3_601));
        assert!(db.state.recovery_requests.is_empty());
    }

    #[test]
    fn only_the_recorded_partner_may_request() {
        let mut db = dev_db();
        db.modify_account("alice", |a| a.recovery_account = "bobby".into())
            .unwrap();
        request_account_recovery(&mut db, &request_op("alice", "alice", 9)).unwrap_err();
    }

    #[test]
    fn a_second_request_overwrites_the_first() {
        let mut db = dev_db();
        db.modify_account("alice", |a| a.recovery_account = "bobby".into())
            .unwrap();
        request_account_recovery(&mut db, &request_op("bobby", "alice", 9)).unwrap();
        request_account_recovery(&mut db, &request_op("bobby", "alice", 11)).unwrap();

        assert_eq!(db.state.recovery_requests.len(), 1);
        let request = db.state.recovery_requests.iter().next().unwrap();
        assert_eq!(request.new_owner_authority, Authority::single_key(key(11)));
    }

    #[test]
    fn recovery_needs_the_current_owner_authority() {
        let mut db = dev_db();
        db.modify_account("alice", |a| a.recovery_account = "bobby".into())
            .unwrap();
        request_account_recovery(&mut db, &request_op("bobby", "alice", 9)).unwrap();
        db.modify_global(|g| g.time = ChainTime::from_secs(3_601));

        recover_account(
            &mut db,
            &Operation::RecoverAccount(RecoverAccount {
                account_to_recover: "alice".into(),
                new_owner_authority: Authority::single_key(key(9)),
                recent_owner_authority: Authority::single_key(key(42)),
            }),
        )
        .unwrap_err();
    }

    #[test]
    fn expired_requests_cannot_be_completed() {
        let mut db = dev_db();
        db.modify_account("alice", |a| a.recovery_account = "bobby".into())
            .unwrap();
        request_account_recovery(&mut db, &request_op("bobby", "alice", 9)).unwrap();
        let recent = db.get_account("alice").unwrap().owner.clone();

        let expiry = db.constants().recovery_request_expiration_secs;
        db.modify_global(|g| g.time = ChainTime::from_secs(expiry));
        recover_account(
            &mut db,
            &Operation::RecoverAccount(RecoverAccount {
                account_to_recover: "alice".into(),
                new_owner_authority: Authority::single_key(key(9)),
                recent_owner_authority: recent,
            }),
        )
        .unwrap_err();
    }

    #[test]
    fn partner_changes_take_effect_after_the_delay() {
        let mut db = dev_db();
        change_recovery_account(
            &mut db,
            &Operation::ChangeRecoveryAccount(ChangeRecoveryAccount {
                account_to_recover: "alice".into(),
                new_recovery_account: "bobby".into(),
            }),
        )
        .unwrap();

        let change = db.state.recovery_changes.iter().next().unwrap();
        assert_eq!(change.recovery_account, "bobby");
        assert_eq!(
            change.effect_time,
            ChainTime::ZERO + db.constants().recovery_account_delay_secs
        );
        // The account still points at the old partner until maintenance
        // applies the change.
        assert_ne!(db.get_account("alice").unwrap().recovery_account, "bobby");

        let delay = db.constants().recovery_account_delay_secs;
        db.modify_global(|g| g.time = ChainTime::from_secs(delay));
        db.prune_expired_state().unwrap();
        assert_eq!(db.get_account("alice").unwrap().recovery_account, "bobby");
        assert!(db.state.recovery_changes.is_empty());
    }

    #[test]
    fn renaming_the_current_partner_cancels_a_pending_switch() {
        let mut db = dev_db();
        let original = db.get_account("alice").unwrap().recovery_account.clone();
        change_recovery_account(
            &mut db,
            &Operation::ChangeRecoveryAccount(ChangeRecoveryAccount {
                account_to_recover: "alice".into(),
                new_recovery_account: "bobby".into(),
            }),
        )
        .unwrap();
        assert_eq!(db.state.recovery_changes.len(), 1);

        change_recovery_account(
            &mut db,
            &Operation::ChangeRecoveryAccount(ChangeRecoveryAccount {
                account_to_recover: "alice".into(),
                new_recovery_account: original.clone(),
            }),
        )
        .unwrap();
        assert!(db.state.recovery_changes.is_empty());

        // Nothing pending, nothing to cancel.
        change_recovery_account(
            &mut db,
            &Operation::ChangeRecoveryAccount(ChangeRecoveryAccount {
                account_to_recover: "alice".into(),
                new_recovery_account: original,
            }),
        )
        .unwrap_err();
    }
}
