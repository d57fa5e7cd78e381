use qrcode::types::Color;
use qrcode::QrCode;

use crate::types::{AppError, AppResult};

/// Module grid of a QR code, row-major, `true` for dark modules
#[derive(Debug, Clone, PartialEq)]
pub struct QrMatrix {
    pub payload: String,
    pub width: usize,
    modules: Vec<bool>,
}

impl QrMatrix {
    pub fn encode(payload: impl Into<String>) -> AppResult<Self> {
        let payload = payload.into();
        let code = QrCode::new(payload.as_bytes())
            .map_err(|e| AppError::Export(format!("QR encoding failed: {}", e)))?;

        let width = code.width();
        let modules = code
            .to_colors()
            .into_iter()
            .map(|color| color == Color::Dark)
            .collect();

        Ok(Self { payload, width, modules })
    }

    /// The text a report's QR code carries
    pub fn payload_for(report_id: &str, public_base_url: Option<&str>) -> String {
        match public_base_url {
            Some(base) => format!("{}/api/reports/{}", base.trim_end_matches('/'), report_id),
            None => format!("Diagnosis ID: {}", report_id),
        }
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.modules[y * self.width + x]
    }

    pub fn dark_count(&self) -> usize {
        self.modules.iter().filter(|dark| **dark).count()
    }

    /// Dark module coordinates as (column, row)
    pub fn dark_modules(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let width = self.width;
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, dark)| **dark)
            .map(move |(i, _)| (i % width, i / width))
    }
}
