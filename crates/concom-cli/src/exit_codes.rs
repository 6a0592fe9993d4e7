/// Clean run.
pub const SUCCESS: i32 = 0;

/// The agent started but failed at runtime.
pub const RUNTIME_ERROR: i32 = 1;

/// The configuration did not load or validate.
pub const CONFIG_ERROR: i32 = 2;
