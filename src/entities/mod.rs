pub mod invoice;

pub use invoice::{Invoice, InvoiceUpdate, NewInvoice, SqlInvoiceStore};
