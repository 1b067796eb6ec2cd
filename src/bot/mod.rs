/// Admin panel, stats and content-management conversations
pub mod admin;
/// User-facing handlers: gate, lookup, delivery
pub mod handlers;
/// Dialogue state for admin conversations
pub mod state;
