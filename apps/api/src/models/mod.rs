// Plain data records handed to the generation layer by the CRUD side of the platform.
// Persistence and validation of these records happen elsewhere.

pub mod candidate;
pub mod job;
