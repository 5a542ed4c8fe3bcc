use std::fmt;

/// Outcome of a command, ordered by severity.
///
/// `Success < Unclear < Failure < DeviceUnresponsive < Unsent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResultCode {
    /// Acknowledged by the modem and, for direct commands, by the device.
    Success,
    /// The device answered with a direct NAK: received but rejected.
    Unclear,
    /// The modem answered with a local NAK.
    Failure,
    /// The modem sent the command but the device never answered.
    DeviceUnresponsive,
    /// The command never made it onto the network.
    Unsent,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }

    /// The more severe of `self` and `other`; `None` is ignored.
    pub fn combine(self, other: impl Into<Option<ResultCode>>) -> ResultCode {
        match other.into() {
            Some(other) => self.max(other),
            None => self,
        }
    }

    /// The most severe code in `codes`, ignoring `None`.
    ///
    /// An empty input summarizes to `Success`.
    pub fn worst<I, T>(codes: I) -> ResultCode
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<ResultCode>>,
    {
        codes
            .into_iter()
            .fold(ResultCode::Success, |acc, code| acc.combine(code))
    }

    pub fn name(self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::Unclear => "unclear",
            ResultCode::Failure => "failure",
            ResultCode::DeviceUnresponsive => "device_unresponsive",
            ResultCode::Unsent => "unsent",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromIterator<ResultCode> for ResultCode {
    fn from_iter<I: IntoIterator<Item = ResultCode>>(iter: I) -> Self {
        ResultCode::worst(iter)
    }
}
