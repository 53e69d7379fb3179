// Vela upgrade coordination.
//
// A passed SoftwareUpgradeProposal becomes the single pending UpgradeConfig.
// Each block the proposer's reported app version is recorded as a signal, and
// at the switch height the signalling voting power is tallied against the
// threshold. Success makes the new protocol version current from the next
// block; failure is recorded and the chain carries on.

pub mod coordinator;
pub mod dec;
pub mod error;
pub mod handler;
pub mod keeper;
pub mod keys;
pub mod querier;
pub mod types;
pub mod validators;

pub use coordinator::{TallyResult, UpgradeCoordinator};
pub use dec::{Dec, DecError};
pub use error::{UpgradeError, CODESPACE};
pub use handler::submit_software_upgrade;
pub use keeper::UpgradeKeeper;
pub use querier::{UpgradeQuerier, QUERY_ROUTE};
pub use types::{ProtocolDefinition, SignalSummary, SoftwareUpgradeProposal, UpgradeConfig, UpgradeInfo, VersionInfo};
pub use validators::{total_power, ValidatorSet};
