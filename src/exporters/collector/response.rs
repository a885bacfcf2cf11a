// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

use crate::exporters::collector::error::ExportError;

/// Application-level reply carried in every collector response body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectorResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

impl CollectorResponse {
    pub fn decode(body: &[u8]) -> Result<Self, ExportError> {
        serde_json::from_slice(body).map_err(|e| ExportError::Decode(e.to_string()))
    }

    /// Map the collector's code onto a result. Only 0 is success.
    pub fn into_result(self) -> Result<(), ExportError> {
        match self.code {
            0 => Ok(()),
            -1 => Err(ExportError::InvalidData(self.msg)),
            -2 => Err(ExportError::UnknownApp(self.msg)),
            -3 => Err(ExportError::InvalidIp(self.msg)),
            code => Err(ExportError::UnexpectedCode {
                code,
                msg: self.msg,
            }),
        }
    }
}
