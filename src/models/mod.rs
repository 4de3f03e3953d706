mod session;

pub use session::EnforcementSession;
