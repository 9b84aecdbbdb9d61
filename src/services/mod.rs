pub mod export_service;
pub mod import_service;
pub mod name_service;
pub mod naming_client;
pub mod rename_service;
pub mod settings_service;
