pub mod bill_assembler;
pub mod billing_batch;
pub mod metering;
pub mod prorata;
pub mod rates;
pub mod scheduler;
