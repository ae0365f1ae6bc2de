pub mod broker;
pub mod connctx;
