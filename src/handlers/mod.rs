pub mod invoices;
pub mod setup;
pub mod tenants;
