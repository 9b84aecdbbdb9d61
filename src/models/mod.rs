pub mod input_file;
pub mod run;
