//! Run stage markers for the type-state pattern.
//!
//! The run order is fixed: Sequencing -> Wiring -> Verification.
//! Each stage only exists once the previous one has completed, so wiring can never
//! observe a partially resolved registry.

/// Marker for the contract deployment / attach stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequencing;

/// Marker for the administrative wiring stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wiring;

/// Marker for the source verification stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verification;

/// Sealed trait for run stages.
mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Sequencing {}
    impl Sealed for super::Wiring {}
    impl Sealed for super::Verification {}
}

/// Marker trait for valid run stages.
pub trait RunStage: sealed::Sealed + Default + Clone + Send + Sync + 'static {
    /// Human readable stage name, used in logs.
    const NAME: &'static str;
}

impl RunStage for Sequencing {
    const NAME: &'static str = "sequencing";
}

impl RunStage for Wiring {
    const NAME: &'static str = "wiring";
}

impl RunStage for Verification {
    const NAME: &'static str = "verification";
}

/// Trait encoding valid stage transitions.
///
/// This is implemented only for valid transitions:
/// - Sequencing -> Wiring
/// - Wiring -> Verification
pub trait NextStage: RunStage {
    type Next: RunStage;
}

impl NextStage for Sequencing {
    type Next = Wiring;
}

impl NextStage for Wiring {
    type Next = Verification;
}

// Verification has no NextStage impl - it's terminal
