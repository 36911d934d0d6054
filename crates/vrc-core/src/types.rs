//! Core enumerations shared by the client, codec, and transports.
//!
//! Every enum here has a stable lowercase wire name used by the line
//! protocol; [`fmt::Display`] produces it and [`FromStr`] parses it.

use std::fmt;
use std::str::FromStr;

/// Error returned when a wire token does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected token.
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The wire name of this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// The type of object a status line refers to.
    ///
    /// The first group are cached entity collections; the rest are routed to
    /// the call machine, the license table, or a singleton record.
    pub enum EntityKind {
        /// Operator profile defining permissions and radio mappings.
        Role => "role",
        /// Selectable vehicle context.
        EntityState => "entity_state",
        /// A radio available to the current role.
        Radio => "radio",
        /// A tunable channel.
        Net => "net",
        /// A jammer transmitter.
        Jammer => "jammer",
        /// A radio effects profile.
        RadioEffect => "radio_effects",
        /// A discoverable server cloud.
        Cloud => "cloud",
        /// Another operator visible on the server.
        Operator => "operator",
        /// A controllable live radio.
        RadioControl => "radctrl",
        /// A background playsound.
        Playsound => "playsound",
        /// A joystick attached to the client station.
        Joystick => "joystick",
        /// A call and its endpoint memberships.
        Call => "call",
        /// A one-way call invitation.
        Invitation => "invitation",
        /// A license granted to this client.
        License => "license",
        /// Connection/session singleton.
        Session => "session",
        /// Headset settings singleton.
        Headset => "headset",
        /// Phone singleton.
        Phone => "phone",
    }
}

wire_enum! {
    /// Progress state of an endpoint within a call.
    pub enum CallProgress {
        /// Invitation in flight, not yet answered.
        Signaling => "signaling",
        /// Participating in the call.
        Connected => "connected",
        /// Participating but on hold.
        Holding => "holding",
        /// Left the call after connecting.
        Ended => "ended",
        /// Declined the invitation.
        Rejected => "rejected",
        /// Did not answer the invitation in time.
        Timeout => "timeout",
    }
}

impl CallProgress {
    /// Whether this state is terminal (the endpoint will be removed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallProgress::Ended | CallProgress::Rejected | CallProgress::Timeout
        )
    }

    /// Whether the signaling protocol allows moving from `self` to `next`.
    ///
    /// Re-asserting the current state is always allowed.
    pub fn can_transition_to(&self, next: CallProgress) -> bool {
        use CallProgress::*;
        if *self == next {
            return true;
        }
        match self {
            Signaling => matches!(next, Connected | Rejected | Timeout | Ended),
            Connected => matches!(next, Holding | Ended),
            Holding => matches!(next, Connected | Ended),
            Ended | Rejected | Timeout => false,
        }
    }
}

wire_enum! {
    /// Why an endpoint left a call.
    pub enum LeaveReason {
        /// Ordinary hang-up.
        Normal => "normal",
        /// The endpoint was busy.
        Busy => "busy",
        /// The invitation was declined.
        Declined => "declined",
        /// The invitation timed out.
        Timeout => "timeout",
        /// The invitation was cancelled by the inviter.
        Cancelled => "cancelled",
        /// The endpoint was transferred to another call.
        Transferred => "transferred",
        /// The server dropped the endpoint after an error.
        Error => "error",
    }
}

wire_enum! {
    /// Status of a license request.
    pub enum LicenseStatus {
        /// Requested, not yet granted.
        Pending => "pending",
        /// Granted and held.
        Granted => "granted",
        /// Released by this client.
        Released => "released",
        /// Revoked or lost by the server.
        Lost => "lost",
    }
}

wire_enum! {
    /// Coarse connection status between the client and its server.
    pub enum ConnectionStatus {
        /// Not connected to any server.
        Disconnected => "disconnected",
        /// Connected to a server.
        Connected => "connected",
    }
}

wire_enum! {
    /// Detailed connection progress, including role negotiation.
    pub enum ConnectState {
        /// No connection attempt in progress.
        Idle => "idle",
        /// Contacting the server.
        Connecting => "connecting",
        /// Fetching roles from the server.
        GettingRoles => "getting_roles",
        /// Applying the requested role.
        SettingRole => "setting_role",
        /// Fully connected with an active role.
        Connected => "connected",
        /// The last connection attempt failed.
        Failed => "failed",
    }
}

wire_enum! {
    /// How the client reaches its server.
    pub enum ConnectionMode {
        /// Direct connection to a server address.
        Server => "server",
        /// Connection through a server cloud.
        Cloud => "cloud",
    }
}

wire_enum! {
    /// Microphone keying mode.
    pub enum MicMode {
        /// Microphone disabled.
        Off => "off",
        /// Voice-operated transmit.
        Vox => "vox",
        /// Transmit only while PTT is pressed.
        Ptt => "ptt",
        /// Always transmitting.
        Hot => "hot",
    }
}

wire_enum! {
    /// Radio audio balance.
    pub enum Balance {
        /// Left ear only.
        Left => "left",
        /// Both ears.
        Center => "center",
        /// Right ear only.
        Right => "right",
    }
}

wire_enum! {
    /// Predefined headset configurations.
    pub enum HeadsetPreset {
        /// Generic defaults.
        Default => "default",
        /// Plantronics USB headset.
        Plantronics => "plantronics",
        /// ASTi Radius.
        Radius => "radius",
    }
}

wire_enum! {
    /// State of a jammer's record/replay function.
    pub enum RecordReplayState {
        /// Nothing recorded or playing.
        Idle => "idle",
        /// Recording requested, waiting for first audio.
        Armed => "armed",
        /// Recording audio.
        Recording => "recording",
        /// Replaying recorded audio.
        Replaying => "replaying",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn unknown_token_reports_kind() {
        let err = "walkie".parse::<EntityKind>().unwrap_err();
        assert_eq!(err.kind, "EntityKind");
        assert_eq!(err.to_string(), "unknown EntityKind: walkie");
    }

    #[test]
    fn call_progress_transitions() {
        use CallProgress::*;
        assert!(Signaling.can_transition_to(Connected));
        assert!(Signaling.can_transition_to(Rejected));
        assert!(Signaling.can_transition_to(Timeout));
        assert!(Connected.can_transition_to(Holding));
        assert!(Holding.can_transition_to(Connected));
        assert!(Holding.can_transition_to(Ended));
        assert!(!Connected.can_transition_to(Signaling));
        assert!(!Ended.can_transition_to(Connected));
        assert!(!Rejected.can_transition_to(Signaling));
        assert!(Connected.can_transition_to(Connected));
    }

    #[test]
    fn terminal_states() {
        assert!(CallProgress::Ended.is_terminal());
        assert!(CallProgress::Rejected.is_terminal());
        assert!(CallProgress::Timeout.is_terminal());
        assert!(!CallProgress::Holding.is_terminal());
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(MicMode::Ptt.to_string(), "ptt");
        assert_eq!(ConnectState::GettingRoles.to_string(), "getting_roles");
        assert_eq!(EntityKind::RadioEffect.to_string(), "radio_effects");
    }
}
