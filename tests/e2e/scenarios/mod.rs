mod actions;
mod edit_sessions;
mod import_export;
mod trees;
