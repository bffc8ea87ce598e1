//! USDT Payment Engine
//!
//! The engine turns two kinds of untrusted payment signals — mirrored TRC20 transfers and fiat
//! gateway callbacks — into exactly-once balance credits against pending top-up orders, and keeps
//! the coupled agent commission ledger consistent with order completion.
//!
//! The library is divided into three main sections:
//! 1. Database management ([`mod@sqlite`]). SQLite is the supported backend. You should never need
//!    to access the database directly; use the public APIs instead. The exception is the data
//!    types, which are defined in the `db_types` module and are public.
//! 2. The public API ([`mod@api`]): [`OrderFlowApi`] for order lifecycle and crediting,
//!    [`AgentApi`] for commission accrual and the withdrawal workflow, and [`RescanApi`] for
//!    admin-driven replay of missed payments. Backends implement the traits in [`mod@traits`].
//! 3. Events ([`mod@events`]): the engine publishes `OrderCredited`, `OrderExpired` and
//!    `WithdrawalStateChanged` events through a simple hook system so that notification layers can
//!    react without the engine knowing about them.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

mod api;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;
pub use api::{AgentApi, OrderFlowApi, RescanApi, RescanError};
pub use traits::{
    AgentError,
    AgentManagement,
    CreditOutcome,
    InsertTransferResult,
    LedgerDatabase,
    LedgerError,
    MatchOutcome,
    MatchWindow,
    OrderStatSummary,
    WithdrawalFilter,
};
