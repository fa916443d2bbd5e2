//! Validation skip flags for block and transaction application.
//!
//! Production pushes blocks with [`NOTHING`]. Replay from the block log and
//! tests that need to fabricate history pass a wider mask; every flag
//! disables exactly one check and nothing else.

/// Run every check.
pub const NOTHING: u32 = 0;

/// Skip stateless transaction validation (`Transaction::validate`).
pub const TRANSACTION_VALIDATION: u32 = 1 << 0;

/// Skip the duplicate-transaction check (and do not record the id).
pub const TRANSACTION_DUPE_CHECK: u32 = 1 << 1;

/// Skip the authority check. Implied by [`TRANSACTION_SIGNATURES`].
pub const AUTHORITY_CHECK: u32 = 1 << 2;

/// Skip signature verification (and with it the authority check).
pub const TRANSACTION_SIGNATURES: u32 = 1 << 3;

/// Skip the reference-block (TaPoS) check.
pub const TAPOS_CHECK: u32 = 1 << 4;

/// Skip the transaction merkle-root check on blocks.
pub const MERKLE_CHECK: u32 = 1 << 5;

/// Skip verification of the producing witness's block signature.
pub const WITNESS_SIGNATURE: u32 = 1 << 6;

/// Skip the check that the block producer owns the slot.
pub const WITNESS_SCHEDULE_CHECK: u32 = 1 << 7;

/// Skip the block size limit.
pub const BLOCK_SIZE_CHECK: u32 = 1 << 8;

/// Skip the per-block conservation-invariant sweep.
pub const VALIDATE_INVARIANTS: u32 = 1 << 9;

/// Mask used when replaying blocks already accepted into the block log.
pub const REPLAY: u32 = TRANSACTION_VALIDATION
    | TRANSACTION_DUPE_CHECK
    | AUTHORITY_CHECK
    | TRANSACTION_SIGNATURES
    | TAPOS_CHECK
    | MERKLE_CHECK
    | WITNESS_SIGNATURE
    | WITNESS_SCHEDULE_CHECK
    | BLOCK_SIZE_CHECK
    | VALIDATE_INVARIANTS;
