use crate::device_client::ClientError;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::{fmt, net::Ipv4Addr};

/// Address of the controlled LED strip
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    host: Ipv4Addr,
    port: u16,
}

impl Endpoint {
    pub const DEFAULT_HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);
    pub const DEFAULT_PORT: u16 = 80;

    /// Create an endpoint, rejecting port 0
    pub fn new(host: Ipv4Addr, port: u16) -> Result<Self, ClientError> {
        if port == 0 {
            return Err(ClientError::InvalidInput(
                "port must be in range 1..=65535".to_string(),
            ));
        }

        Ok(Self { host, port })
    }

    pub fn host(&self) -> Ipv4Addr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Absolute URL of `path` on this endpoint
    pub fn url(&self, path: &str) -> String {
        let normalized_path = path.trim_start_matches('/');
        format!("http://{self}/{normalized_path}")
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST,
            port: Self::DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Raw endpoint values as entered in a settings form or read from preferences
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EndpointSettings {
    #[validate(maximum = 255)]
    pub octet1: u32,
    #[validate(maximum = 255)]
    pub octet2: u32,
    #[validate(maximum = 255)]
    pub octet3: u32,
    #[validate(maximum = 255)]
    pub octet4: u32,
    #[validate(minimum = 1)]
    #[validate(maximum = 65535)]
    pub port: u32,
}

impl TryFrom<EndpointSettings> for Endpoint {
    type Error = ClientError;

    fn try_from(settings: EndpointSettings) -> Result<Self, Self::Error> {
        settings
            .validate()
            .map_err(|e| ClientError::InvalidInput(format!("invalid endpoint settings: {e}")))?;

        let octet = |value: u32| {
            u8::try_from(value)
                .map_err(|_| ClientError::InvalidInput(format!("octet out of range: {value}")))
        };
        let host = Ipv4Addr::new(
            octet(settings.octet1)?,
            octet(settings.octet2)?,
            octet(settings.octet3)?,
            octet(settings.octet4)?,
        );
        let port = u16::try_from(settings.port).map_err(|_| {
            ClientError::InvalidInput(format!("port out of range: {}", settings.port))
        })?;

        Endpoint::new(host, port)
    }
}

impl From<Endpoint> for EndpointSettings {
    fn from(endpoint: Endpoint) -> Self {
        let [octet1, octet2, octet3, octet4] = endpoint.host.octets();
        Self {
            octet1: octet1.into(),
            octet2: octet2.into(),
            octet3: octet3.into(),
            octet4: octet4.into(),
            port: endpoint.port.into(),
        }
    }
}

/// RGB color of the strip, serialized as `{"r":..,"g":..,"b":..}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Color assumed before the device reported one
    pub const INITIAL: Color = Color::new(128, 128, 128);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from unchecked components, each must be in 0..=255
    pub fn try_from_components(r: i64, g: i64, b: i64) -> Result<Self, ClientError> {
        let component = |name: &str, value: i64| {
            u8::try_from(value).map_err(|_| {
                ClientError::InvalidInput(format!(
                    "color component {name} out of range 0..=255: {value}"
                ))
            })
        };

        Ok(Self {
            r: component("r", r)?,
            g: component("g", g)?,
            b: component("b", b)?,
        })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
    #[default]
    Unknown,
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on { PowerState::On } else { PowerState::Off }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "ON"),
            PowerState::Off => write!(f, "OFF"),
            PowerState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Belief about whether the endpoint currently answers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Reachability {
    Online,
    #[default]
    Offline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub power: PowerState,
    pub color: Color,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: PowerState::Unknown,
            color: Color::INITIAL,
        }
    }
}

/// View published to the UI after every state change
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub reachability: Reachability,
    pub device: DeviceState,
    pub endpoint: Endpoint,
}

/// Transient message for the UI (toast)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Notice {
    /// Free text answered by the device root
    Banner(String),
    /// The root probe after a settings change failed
    HostUnreachable,
    /// A command was dropped because the device is offline
    Offline,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Banner(text) => write!(f, "{text}"),
            Notice::HostUnreachable => write!(f, "Host Unreachable"),
            Notice::Offline => write!(f, "Offline"),
        }
    }
}
