//! Behaviour contracts for ledger backends.
//!
//! [`LedgerDatabase`] covers orders, user balances and mirrored transfers; [`AgentManagement`]
//! covers the agent commission ledger and the withdrawal workflow. A backend (currently SQLite)
//! implements both; the public APIs are generic over these traits.
mod agent_management;
mod data_objects;
mod ledger_database;

pub use agent_management::{AgentError, AgentManagement};
pub use data_objects::{
    CreditOutcome,
    InsertTransferResult,
    MatchOutcome,
    MatchWindow,
    OrderStatSummary,
    WithdrawalFilter,
};
pub use ledger_database::{LedgerDatabase, LedgerError};
