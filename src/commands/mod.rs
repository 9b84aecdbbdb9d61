pub mod cli_commands;
pub mod rename_pipeline;
