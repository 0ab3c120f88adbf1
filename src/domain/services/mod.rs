pub mod bracket;
pub mod entry_controller;
pub mod exit_evaluator;
pub mod position_manager;
pub mod position_sizer;
pub mod reconciliation;
pub mod trailing;
