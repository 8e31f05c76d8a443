//! # Finance Facade
//!
//! Income, expenses and per-category budgets.
//!
//! Recording or editing an expense re-reads the budget for its category and
//! month and runs the overrun rule on it, both when it is applied at once and
//! when it replays after an outage. The periodic scan covers every budget.

use async_trait::async_trait;
use ranch_core::catalog::finance as rules;
use ranch_core::validation::{
    validate_amount, validate_budget_limit, validate_name, validate_new_transaction, validate_period,
};
use ranch_core::{
    budget_period, Budget, BudgetLimit, NewTransaction, RuleSet, Transaction, TransactionKind,
    TransactionPatch,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{local_id, unexpected, ScanSchedule};
use crate::alerts::AlertRegistry;
use crate::cache::Invalidation;
use crate::engine::{ReplayHook, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::evaluator::{RuleEvaluator, ScanSummary};
use crate::operation::{Command, Domain, Query, QueuedReceipt, Submission};

// =============================================================================
// Operations
// =============================================================================

#[derive(Debug)]
pub struct Finance;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FinanceCommand {
    RecordTransaction(NewTransaction),
    UpdateTransaction { id: String, patch: TransactionPatch },
    RemoveTransaction { id: String },
    SetBudget(BudgetLimit),
}

impl Command for FinanceCommand {
    fn kind(&self) -> &'static str {
        match self {
            FinanceCommand::RecordTransaction(_) => "record_transaction",
            FinanceCommand::UpdateTransaction { .. } => "update_transaction",
            FinanceCommand::RemoveTransaction { .. } => "remove_transaction",
            FinanceCommand::SetBudget(_) => "set_budget",
        }
    }

    fn invalidation(&self) -> Invalidation {
        match self {
            FinanceCommand::SetBudget(_) => Invalidation::endpoint("finance/budgets"),
            // Spending moves both the ledger and the budgets.
            _ => Invalidation::endpoint("finance/"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FinanceQuery {
    Transactions {
        period: Option<String>,
        category: Option<String>,
    },
    Budgets { period: Option<String> },
    Budget { category: String, period: String },
}

impl Query for FinanceQuery {
    fn endpoint(&self) -> String {
        match self {
            FinanceQuery::Transactions { .. } => "finance/transactions".to_string(),
            FinanceQuery::Budgets { .. } => "finance/budgets".to_string(),
            FinanceQuery::Budget { category, period } => {
                format!("finance/budgets/{}/{}", category, period)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinanceResponse {
    Transactions(Vec<Transaction>),
    Transaction(Transaction),
    Budgets(Vec<Budget>),
    Budget(Budget),
    Removed { id: String },
}

impl FinanceResponse {
    pub fn into_transactions(self) -> SyncResult<Vec<Transaction>> {
        match self {
            FinanceResponse::Transactions(transactions) => Ok(transactions),
            other => Err(unexpected("Transactions", &other)),
        }
    }

    pub fn into_transaction(self) -> SyncResult<Transaction> {
        match self {
            FinanceResponse::Transaction(transaction) => Ok(transaction),
            other => Err(unexpected("Transaction", &other)),
        }
    }

    pub fn into_budgets(self) -> SyncResult<Vec<Budget>> {
        match self {
            FinanceResponse::Budgets(budgets) => Ok(budgets),
            other => Err(unexpected("Budgets", &other)),
        }
    }

    pub fn into_budget(self) -> SyncResult<Budget> {
        match self {
            FinanceResponse::Budget(budget) => Ok(budget),
            other => Err(unexpected("Budget", &other)),
        }
    }
}

impl Domain for Finance {
    const NAME: &'static str = "finance";
    type Command = FinanceCommand;
    type Query = FinanceQuery;
    type Response = FinanceResponse;

    fn placeholder(command: &FinanceCommand, receipt: &QueuedReceipt) -> Option<FinanceResponse> {
        match command {
            FinanceCommand::RecordTransaction(new) => Some(FinanceResponse::Transaction(
                new.clone().into_local(local_id(), receipt.enqueued_at),
            )),
            FinanceCommand::RemoveTransaction { id } => {
                Some(FinanceResponse::Removed { id: id.clone() })
            }
            // Spent-to-date is only known to the server.
            FinanceCommand::UpdateTransaction { .. } | FinanceCommand::SetBudget(_) => None,
        }
    }
}

// =============================================================================
// Facade
// =============================================================================

pub struct FinanceFacade {
    engine: SyncEngine<Finance>,
    evaluator: RuleEvaluator<Budget>,
    scan_interval: Duration,
    schedule: ScanSchedule,
}

impl FinanceFacade {
    pub fn new(engine: SyncEngine<Finance>, registry: AlertRegistry, scan_interval: Duration) -> Self {
        let evaluator = RuleEvaluator::new(
            RuleSet::new().with(rules::budget_overrun(scan_interval)),
            registry,
            engine.clock(),
        );
        engine.set_replay_hook(Arc::new(ReplayedEntries(evaluator.clone())));
        FinanceFacade {
            engine,
            evaluator,
            scan_interval,
            schedule: ScanSchedule::default(),
        }
    }

    pub fn engine(&self) -> &SyncEngine<Finance> {
        &self.engine
    }

    pub fn registry(&self) -> &AlertRegistry {
        self.evaluator.registry()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn list_transactions(
        &self,
        period: Option<&str>,
        category: Option<&str>,
    ) -> SyncResult<Vec<Transaction>> {
        if let Some(period) = period {
            validate_period(period)?;
        }
        let query = FinanceQuery::Transactions {
            period: period.map(str::to_string),
            category: category.map(str::to_string),
        };
        self.engine.read(&query).await?.into_transactions()
    }

    pub async fn list_budgets(&self, period: Option<&str>) -> SyncResult<Vec<Budget>> {
        if let Some(period) = period {
            validate_period(period)?;
        }
        let query = FinanceQuery::Budgets {
            period: period.map(str::to_string),
        };
        self.engine.read(&query).await?.into_budgets()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn record_transaction(
        &self,
        new: NewTransaction,
    ) -> SyncResult<Submission<Transaction>> {
        validate_new_transaction(&new)?;
        self.submit_transaction(FinanceCommand::RecordTransaction(new))
            .await
    }

    pub async fn update_transaction(
        &self,
        id: &str,
        patch: TransactionPatch,
    ) -> SyncResult<Submission<Transaction>> {
        if let Some(category) = &patch.category {
            validate_name("category", category)?;
        }
        if let Some(amount) = patch.amount {
            validate_amount(amount)?;
        }
        self.submit_transaction(FinanceCommand::UpdateTransaction {
            id: id.to_string(),
            patch,
        })
        .await
    }

    pub async fn remove_transaction(&self, id: &str) -> SyncResult<Submission<()>> {
        let submission = self
            .engine
            .enqueue_or_execute(FinanceCommand::RemoveTransaction { id: id.to_string() })
            .await?;
        Ok(submission.map(|_| ()))
    }

    /// Sets a category limit for one period and checks it against spending
    /// so far.
    pub async fn set_budget(&self, limit: BudgetLimit) -> SyncResult<Submission<Budget>> {
        validate_budget_limit(&limit)?;
        let submission = self
            .engine
            .enqueue_or_execute(FinanceCommand::SetBudget(limit))
            .await?
            .try_map(FinanceResponse::into_budget)?;

        if let Submission::Applied(budget) = &submission {
            self.evaluator.evaluate(budget.clone()).await;
        }
        Ok(submission)
    }

    async fn submit_transaction(
        &self,
        command: FinanceCommand,
    ) -> SyncResult<Submission<Transaction>> {
        let submission = self
            .engine
            .enqueue_or_execute(command)
            .await?
            .try_map(FinanceResponse::into_transaction)?;

        if let Submission::Applied(transaction) = &submission {
            if transaction.kind == TransactionKind::Expense {
                check_budget(&self.engine, &self.evaluator, transaction).await;
            }
        }
        Ok(submission)
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Runs the overrun rule over every budget.
    pub async fn scan(&self) -> SyncResult<ScanSummary> {
        scan(&self.engine, &self.evaluator).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn start(&self) -> SyncResult<()> {
        self.engine.start()?;

        let engine = self.engine.clone();
        let evaluator = self.evaluator.clone();
        self.schedule.start("finance.scan", self.scan_interval, move || {
            let engine = engine.clone();
            let evaluator = evaluator.clone();
            async move { scan(&engine, &evaluator).await }
        });
        Ok(())
    }

    pub fn destroy(&self) {
        self.schedule.stop();
        self.engine.destroy();
    }

    pub fn is_scanning(&self) -> bool {
        self.schedule.is_running()
    }
}

/// Re-reads the budget an expense counts against and evaluates it. The
/// expense itself is already applied, so failures here are only logged.
async fn check_budget(engine: &SyncEngine<Finance>, evaluator: &RuleEvaluator<Budget>, expense: &Transaction) {
    let query = FinanceQuery::Budget {
        category: expense.category.clone(),
        period: budget_period(expense.occurred_on),
    };
    let budget = match engine.refresh(&query).await {
        Ok(response) => response.into_budget(),
        Err(err) => Err(err),
    };
    match budget {
        Ok(budget) => {
            evaluator.evaluate(budget).await;
        }
        Err(SyncError::RemoteRejected { status: 404, .. }) => {
            debug!(category = %expense.category, "No budget set for category");
        }
        Err(err) => {
            warn!(
                transaction_id = %expense.id,
                category = %expense.category,
                error = %err,
                "Budget check after expense failed"
            );
        }
    }
}

/// Runs the direct-submission checks for entries applied during replay.
struct ReplayedEntries(RuleEvaluator<Budget>);

#[async_trait]
impl ReplayHook<Finance> for ReplayedEntries {
    async fn applied(&self, engine: &SyncEngine<Finance>, _command: &FinanceCommand, response: FinanceResponse) {
        match response {
            FinanceResponse::Transaction(transaction) if transaction.kind == TransactionKind::Expense => {
                check_budget(engine, &self.0, &transaction).await;
            }
            FinanceResponse::Budget(budget) => {
                self.0.evaluate(budget).await;
            }
            _ => {}
        }
    }
}

async fn scan(engine: &SyncEngine<Finance>, evaluator: &RuleEvaluator<Budget>) -> SyncResult<ScanSummary> {
    let budgets = engine
        .refresh(&FinanceQuery::Budgets { period: None })
        .await?
        .into_budgets()?;
    Ok(evaluator.evaluate_all(budgets).await)
}
