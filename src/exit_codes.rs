/// The run completed and produced a report.
pub const OK: i32 = 0;
/// A checkpoint aborted the run.
pub const ABORTED: i32 = 1;
/// The repository reference was rejected before the run started.
pub const INVALID_REFERENCE: i32 = 2;
/// Configuration or another startup failure.
pub const STARTUP: i32 = 3;
