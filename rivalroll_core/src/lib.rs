pub mod animation;
pub mod catalog;
pub mod icons;
pub mod reel;
pub mod rng;
pub mod roster;
pub mod session;

pub use crate::animation::{Frame, SpinAnimation};
pub use crate::catalog::{CatalogConfig, CatalogError, CharacterImage, ImageCatalog};
pub use crate::icons::{CustomIconMap, ICONS_KEY};
pub use crate::reel::{SlotWindow, SpinTiming};
pub use crate::rng::{derive_hash_hex, SpinRng};
pub use crate::roster::{Character, Roster, DEFAULT_ROSTER};
pub use crate::session::{
    reduce, Action, HistoryEntry, PlayerId, PlayerState, PlayerTheme, SessionError,
    SessionState, SpinPhase, Transition,
};
