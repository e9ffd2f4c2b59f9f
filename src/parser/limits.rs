//! Decoder implementation limits.
//!
//! Counts read from the wire are checked against these before anything is
//! allocated, so a malformed length prefix fails fast instead of reserving
//! gigabytes. The values follow the limits mainstream engines enforce.

// =============================================================================
// Module-level limits
// =============================================================================

/// Maximum number of type definitions in a module
pub const MAX_TYPES: u32 = 1_000_000;

/// Maximum number of defined functions in a module
pub const MAX_FUNCTIONS: u32 = 1_000_000;

/// Maximum number of imports in a module
pub const MAX_IMPORTS: u32 = 100_000;

/// Maximum number of exports in a module
pub const MAX_EXPORTS: u32 = 100_000;

/// Maximum number of globals in a module
pub const MAX_GLOBALS: u32 = 1_000_000;

/// Maximum number of tables in a module
pub const MAX_TABLES: u32 = 100_000;

/// Maximum number of memories in a module
pub const MAX_MEMORIES: u32 = 100_000;

pub const MAX_DATA_SEGMENTS: u32 = 100_000;
pub const MAX_ELEMENT_SEGMENTS: u32 = 100_000;

/// Upper bound for any generic length-prefixed vector
pub const MAX_VECTOR_LENGTH: u32 = 10_000_000;

// =============================================================================
// Function-level limits
// =============================================================================

pub const MAX_FUNCTION_PARAMS: u32 = 1_000;
pub const MAX_FUNCTION_RETURNS: u32 = 1_000;

/// Maximum number of declared locals in a function, summed over all runs
pub const MAX_FUNCTION_LOCALS: u32 = 50_000;

/// Maximum nesting depth of block/loop/if while decoding a body
pub const MAX_NESTING_DEPTH: u32 = 1_024;

// =============================================================================
// Instruction-level limits
// =============================================================================

/// Maximum number of labels in a br_table instruction
pub const MAX_BR_TABLE_LABELS: u32 = 65_536;

/// Maximum number of value types in a typed select
pub const MAX_SELECT_TYPED_VALUES: u32 = 1;

/// Maximum number of entries in one element segment
pub const MAX_TABLE_INIT_ENTRIES: u32 = 10_000_000;
