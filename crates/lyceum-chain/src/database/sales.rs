//! Research token sale activation, contribution, and settlement.

use tracing::{debug, info};

use lyceum_types::{multiply_ratio, AccountName, ChainTime, TokenSaleId, Tokens};

use crate::error::{ensure, ChainError};
use crate::state::{ResearchToken, SaleContribution, TokenSaleStatus};

use super::Database;

impl Database {
    /// Walks every sale each block: opens the ones whose window has
    /// started and settles the ones whose window has ended.
    pub(crate) fn process_research_token_sales(&mut self) -> Result<(), ChainError> {
        let now = self.head_block_time();
        let due: Vec<(TokenSaleId, TokenSaleStatus, ChainTime, ChainTime)> = self
            .state
            .token_sales
            .iter()
            .filter(|s| {
                matches!(s.status, TokenSaleStatus::Inactive | TokenSaleStatus::Active)
            })
            .map(|s| (s.id, s.status, s.start_time, s.end_time))
            .collect();
        for (sale_id, status, start, end) in due {
            if now >= end {
                self.settle_token_sale(sale_id)?;
            } else if status == TokenSaleStatus::Inactive && now >= start {
                self.activate_token_sale(sale_id)?;
            }
        }
        Ok(())
    }

    pub(crate) fn activate_token_sale(&mut self, sale_id: TokenSaleId) -> Result<(), ChainError> {
        self.state
            .token_sales
            .modify(sale_id, |s| s.status = TokenSaleStatus::Active)?;
        debug!(sale = sale_id, "token sale opened");
        Ok(())
    }

    /// Closes a sale. Below the soft cap every contribution is refunded and
    /// the escrowed share units return to the research; otherwise each
    /// contributor receives units pro rata, rounding dust returns to the
    /// research, and the pooled currency is credited to the owning group.
    pub(crate) fn settle_token_sale(&mut self, sale_id: TokenSaleId) -> Result<(), ChainError> {
        let sale = self.get_research_token_sale(sale_id)?;
        let research_id = sale.research_id;
        let balance_tokens = sale.balance_tokens;
        let soft_cap = sale.soft_cap;
        let total = sale.total_amount;

        let contributions: Vec<(u64, AccountName, Tokens)> = self
            .state
            .sale_contributions
            .iter()
            .filter(|c| c.token_sale_id == sale_id)
            .map(|c| (c.id, c.contributor.clone(), c.amount))
            .collect();

        if total < soft_cap {
            for (contribution_id, contributor, amount) in contributions {
                self.adjust_balance(&contributor, amount)?;
                self.state.sale_contributions.remove(contribution_id)?;
            }
            self.state
                .researches
                .modify(research_id, |r| r.owned_tokens += balance_tokens)?;
            self.state.token_sales.modify(sale_id, |s| {
                s.status = TokenSaleStatus::Expired;
                s.balance_tokens = 0;
            })?;
            info!(sale = sale_id, raised = %total, "token sale expired below soft cap");
            return Ok(());
        }

        let mut distributed_units = 0i64;
        for (contribution_id, contributor, amount) in contributions {
            let units = multiply_ratio(balance_tokens, amount.amount(), total.amount());
            if units > 0 {
                self.grant_research_tokens(&contributor, research_id, units);
                distributed_units += units;
            }
            self.state.sale_contributions.remove(contribution_id)?;
        }
        let dust = balance_tokens - distributed_units;
        let group_id = self.get_research(research_id)?.research_group_id;
        self.state.researches.modify(research_id, |r| {
            r.owned_tokens += dust;
        })?;
        self.state
            .research_groups
            .modify(group_id, |g| g.balance += total)?;
        self.state.token_sales.modify(sale_id, |s| {
            s.status = TokenSaleStatus::Finished;
            s.balance_tokens = 0;
        })?;
        info!(sale = sale_id, raised = %total, units = distributed_units, "token sale finished");
        Ok(())
    }

    /// The contribution path: lazily opens a due sale, clamps at the hard
    /// cap, escrows the currency, and settles immediately when the cap is
    /// reached. Returns the amount actually taken.
    pub(crate) fn contribute_to_token_sale(
        &mut self,
        sale_id: TokenSaleId,
        contributor: &str,
        amount: Tokens,
    ) -> Result<Tokens, ChainError> {
        let now = self.head_block_time();
        let sale = self.get_research_token_sale(sale_id)?;
        let status = sale.status;
        let start = sale.start_time;
        let end = sale.end_time;
        let room = sale.hard_cap - sale.total_amount;
        ensure!(
            status == TokenSaleStatus::Active
                || (status == TokenSaleStatus::Inactive && now >= start),
            "token sale {sale_id} is not open for contributions"
        );
        ensure!(now < end, "token sale {sale_id} has ended");
        if status == TokenSaleStatus::Inactive {
            self.activate_token_sale(sale_id)?;
        }

        let taken = amount.min(room);
        ensure!(taken.is_positive(), "token sale {sale_id} is already full");

        self.adjust_balance(contributor, -taken)?;
        let existing = self
            .state
            .sale_contributions
            .iter()
            .find(|c| c.token_sale_id == sale_id && c.contributor == contributor)
            .map(|c| c.id);
        match existing {
            Some(id) => self
                .state
                .sale_contributions
                .modify(id, |c| c.amount += taken)?,
            None => {
                self.state.sale_contributions.create(|id| SaleContribution {
                    id,
                    token_sale_id: sale_id,
                    contributor: contributor.to_string(),
                    amount: taken,
                    contribution_time: now,
                });
            }
        }
        let filled = {
            self.state
                .token_sales
                .modify(sale_id, |s| s.total_amount += taken)?;
            let sale = self.get_research_token_sale(sale_id)?;
            sale.total_amount >= sale.hard_cap
        };
        if filled {
            self.settle_token_sale(sale_id)?;
        }
        Ok(taken)
    }

    pub(crate) fn grant_research_tokens(&mut self, account: &str, research_id: u64, units: i64) {
        let existing = self
            .find_research_token(account, research_id)
            .map(|t| t.id);
        match existing {
            Some(id) => self
                .state
                .research_tokens
                .modify(id, |t| t.amount += units)
                .expect("research token row exists"),
            None => {
                self.state.research_tokens.create(|id| ResearchToken {
                    id,
                    account: account.to_string(),
                    research_id,
                    amount: units,
                });
            }
        }
    }
}
