pub mod allow;
pub mod block;
pub mod config;
pub mod rules;
pub mod run;
pub mod session;
pub mod switch;
pub mod whitelist;
