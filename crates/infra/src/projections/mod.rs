//! Projection implementations (read model builders).

pub mod accounting;
pub mod customer_balances;
pub mod cursor_store;
pub mod inventory_stock;
pub mod inventory_valuation;
pub mod invoices;
pub mod invoicing;
pub mod open_invoices;
pub mod parties;
pub mod products;
pub mod purchasing;
pub mod replay;
pub mod sales_orders;
pub mod users;

pub use cursor_store::{PostgresCursorStore, ProjectionCursorStore};
pub use users::{default_role_permissions, UserReadModel};


