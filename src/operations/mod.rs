pub mod record_op;
