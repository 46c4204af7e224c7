pub mod check_config;
pub mod poll;
pub mod post_custom;
pub mod run;
