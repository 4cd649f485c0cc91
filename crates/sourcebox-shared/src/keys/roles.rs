//! Zero-sized role markers.
//!
//! Every key type is parameterised by one of these so that, for example, a
//! CoverNode messaging key can never be passed where a journalist messaging
//! key is expected. [`ChildRole`] encodes which role certifies which, so the
//! certificate chain is checked by the compiler as well as at runtime.

use std::fmt::Debug;
use std::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

pub trait Role:
    sealed::Sealed + Clone + Copy + Debug + PartialEq + Eq + PartialOrd + Ord + Hash + Send + Sync + 'static
{
    const DISPLAY_NAME: &'static str;
}

/// A role whose keys are certified by a key of `Self::Parent`.
pub trait ChildRole: Role {
    type Parent: Role;
}

macro_rules! define_role {
    ($name:ident, $display:literal) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl Role for $name {
            const DISPLAY_NAME: &'static str = $display;
        }
    };
    ($name:ident, $display:literal, parent = $parent:ident) => {
        define_role!($name, $display);

        impl ChildRole for $name {
            type Parent = $parent;
        }
    };
}

define_role!(Organization, "organization");
define_role!(TrustedOrganization, "trusted organization");

define_role!(CoverNodeProvisioning, "covernode provisioning", parent = Organization);
define_role!(CoverNodeId, "covernode id", parent = CoverNodeProvisioning);
define_role!(CoverNodeMessaging, "covernode messaging", parent = CoverNodeId);

define_role!(JournalistProvisioning, "journalist provisioning", parent = Organization);
define_role!(JournalistId, "journalist id", parent = JournalistProvisioning);
define_role!(JournalistMessaging, "journalist messaging", parent = JournalistId);

define_role!(User, "user");
