//! Witness election and the deterministic production schedule.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use lyceum_types::{AccountName, ChainProperties, ChainTime, Version};

use crate::error::ChainError;
use crate::state::ScheduleKind;

use super::Database;

/// Distance covered by one full lap of the virtual schedule race.
const VIRTUAL_SCHEDULE_LAP: u128 = u128::MAX;

impl Database {
    /// Applies a vote-weight delta to a witness while keeping its virtual
    /// race position consistent: the racer first advances to the current
    /// virtual time under the old weight, then reschedules under the new.
    pub(crate) fn adjust_witness_votes(
        &mut self,
        owner: &str,
        delta: i64,
    ) -> Result<(), ChainError> {
        let virtual_now = self.witness_schedule().current_virtual_time;
        let id = self.get_witness(owner)?.id;
        self.state.witnesses.modify(id, |w| {
            let elapsed = virtual_now.saturating_sub(w.virtual_last_update);
            let speed = w.votes.max(0) as u128 + 1;
            w.virtual_position = w
                .virtual_position
                .saturating_add(elapsed.saturating_mul(speed));
            w.virtual_last_update = virtual_now;
            w.votes += delta;
            let remaining = VIRTUAL_SCHEDULE_LAP.saturating_sub(w.virtual_position);
            let new_speed = w.votes.max(0) as u128 + 1;
            w.virtual_scheduled_time = virtual_now.saturating_add(remaining / new_speed);
        })?;
        Ok(())
    }

    /// Re-elects the witness set at a round boundary: top seats by vote
    /// weight, timeshare seats by the virtual race, then medians, the
    /// hardfork tally, and a deterministic shuffle of production order.
    pub(crate) fn update_witness_schedule(&mut self) {
        let num_scheduled = u32::from(self.witness_schedule().num_scheduled_witnesses).max(1);
        if self.head_block_num() % num_scheduled != 0 {
            return;
        }

        let max_top = self.constants().max_voted_witnesses as usize;
        let max_timeshare = self.constants().max_timeshare_witnesses as usize;

        let mut ranked: Vec<(i64, AccountName, u64)> = self
            .state
            .witnesses
            .iter()
            .map(|w| (w.votes, w.owner.clone(), w.id))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        let top: Vec<(u64, AccountName)> = ranked
            .iter()
            .take(max_top)
            .map(|(_, name, id)| (*id, name.clone()))
            .collect();
        let top_ids: BTreeSet<u64> = top.iter().map(|(id, _)| *id).collect();

        let mut racers: Vec<(u128, AccountName, u64)> = self
            .state
            .witnesses
            .iter()
            .filter(|w| !top_ids.contains(&w.id))
            .map(|w| (w.virtual_scheduled_time, w.owner.clone(), w.id))
            .collect();
        racers.sort();
        let timeshare: Vec<(u64, AccountName)> = racers
            .into_iter()
            .take(max_timeshare)
            .map(|(_, name, id)| (id, name))
            .collect();
        let timeshare_ids: BTreeSet<u64> = timeshare.iter().map(|(id, _)| *id).collect();

        // The virtual clock jumps forward to each winner's arrival; the
        // winner restarts its lap from there.
        let mut new_virtual_time = self.witness_schedule().current_virtual_time;
        for (id, _) in &timeshare {
            let arrival = self
                .state
                .witnesses
                .get(*id)
                .map(|w| w.virtual_scheduled_time)
                .unwrap_or(new_virtual_time);
            new_virtual_time = new_virtual_time.max(arrival);
            self.state
                .witnesses
                .modify(*id, |w| {
                    w.virtual_position = 0;
                    w.virtual_last_update = new_virtual_time;
                    let speed = w.votes.max(0) as u128 + 1;
                    w.virtual_scheduled_time =
                        new_virtual_time.saturating_add(VIRTUAL_SCHEDULE_LAP / speed);
                })
                .expect("witness row exists");
        }

        let all_ids: Vec<u64> = self.state.witnesses.iter().map(|w| w.id).collect();
        for id in all_ids {
            let kind = if top_ids.contains(&id) {
                ScheduleKind::TopVoted
            } else if timeshare_ids.contains(&id) {
                ScheduleKind::Timeshare
            } else {
                ScheduleKind::Unscheduled
            };
            self.state
                .witnesses
                .modify(id, |w| w.schedule = kind)
                .expect("witness row exists");
        }

        let mut active: Vec<AccountName> = top.iter().map(|(_, name)| name.clone()).collect();
        active.extend(timeshare.iter().map(|(_, name)| name.clone()));

        let (median_props, majority_version) = self.scheduled_medians(&active);
        self.tally_hardfork_votes(&active);

        let top_weight = self.constants().top_witness_pay_weight as i64;
        let timeshare_weight = self.constants().timeshare_pay_weight as i64;
        let normalization =
            top.len() as i64 * top_weight + timeshare.len() as i64 * timeshare_weight;

        let head = self.head_block_num();
        let head_time = self.head_block_time();
        shuffle_witnesses(&mut active, head_time);
        let count = active.len().max(1) as u8;

        debug!(
            round = head / num_scheduled,
            scheduled = count,
            majority_version = %majority_version,
            "witness schedule updated"
        );

        let max_block_size = median_props.maximum_block_size;
        self.state
            .witness_schedule
            .modify(0, |s| {
                s.current_shuffled_witnesses = active;
                s.num_scheduled_witnesses = count;
                s.median_props = median_props;
                s.majority_version = majority_version;
                s.current_virtual_time = new_virtual_time;
                s.next_shuffle_block_num = head + u32::from(count);
                s.witness_pay_normalization_factor = normalization.max(1);
            })
            .expect("witness schedule singleton exists");
        self.modify_global(|g| g.maximum_block_size = max_block_size);
    }

    /// Per-field medians of the scheduled witnesses' published properties,
    /// plus the median running version.
    fn scheduled_medians(&self, active: &[AccountName]) -> (ChainProperties, Version) {
        let mut fees = Vec::with_capacity(active.len());
        let mut sizes = Vec::with_capacity(active.len());
        let mut versions = Vec::with_capacity(active.len());
        for name in active {
            if let Some(w) = self.find_witness(name) {
                fees.push(w.props.account_creation_fee);
                sizes.push(w.props.maximum_block_size);
                versions.push(w.running_version);
            }
        }
        if fees.is_empty() {
            return (ChainProperties::default(), Version::default());
        }
        fees.sort();
        sizes.sort();
        versions.sort();
        let mid = fees.len() / 2;
        (
            ChainProperties {
                account_creation_fee: fees[mid],
                maximum_block_size: sizes[mid],
            },
            versions[mid],
        )
    }

    /// Schedules the next hardfork when enough of the elected witnesses
    /// agree on the same version and activation time; otherwise any
    /// previously scheduled fork is withdrawn.
    fn tally_hardfork_votes(&mut self, active: &[AccountName]) {
        let mut tally: BTreeMap<(Version, ChainTime), u32> = BTreeMap::new();
        for name in active {
            if let Some(w) = self.find_witness(name) {
                *tally
                    .entry((w.hardfork_version_vote, w.hardfork_time_vote))
                    .or_insert(0) += 1;
            }
        }
        let required = self.constants().hardfork_required_witnesses;
        let winner = tally
            .into_iter()
            .max_by_key(|&(_, count)| count)
            .filter(|&(_, count)| count >= required);
        match winner {
            Some(((version, time), count)) => {
                let current = self.hardfork_properties().next_hardfork_version;
                if version != current {
                    info!(version = %version, time = %time, votes = count, "hardfork scheduled");
                }
                self.state
                    .hardforks
                    .modify(0, |h| {
                        h.next_hardfork_version = version;
                        h.next_hardfork_time = time;
                    })
                    .expect("hardfork singleton exists");
            }
            None => {
                let current = self.hardfork_properties().current_hardfork_version;
                self.state
                    .hardforks
                    .modify(0, |h| h.next_hardfork_version = current)
                    .expect("hardfork singleton exists");
            }
        }
    }
}

/// Fisher-Yates with a xorshift generator seeded from chain time, so every
/// node shuffles the round identically.
fn shuffle_witnesses(witnesses: &mut [AccountName], now: ChainTime) {
    const MULTIPLIER: u64 = 2_685_821_657_736_338_717;
    let now_hi = u64::from(now.secs()) << 32;
    let n = witnesses.len();
    for i in 0..n {
        let mut k = now_hi.wrapping_add((i as u64).wrapping_mul(MULTIPLIER));
        k ^= k >> 12;
        k ^= k << 25;
        k ^= k >> 27;
        k = k.wrapping_mul(MULTIPLIER);
        let jmax = (n - i) as u64;
        let j = i + (k % jmax) as usize;
        witnesses.swap(i, j);
    }
}
