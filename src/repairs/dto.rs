use serde::{Deserialize, Serialize};

use crate::notify::NotificationOutcome;
use crate::repairs::model::Repair;

/// Ticket intake form. Missing text fields deserialize as empty and are
/// reported by validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepairRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, alias = "serial")]
    pub serial_number: String,
    #[serde(default)]
    pub fault: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub return_date: String,
    #[serde(default, alias = "responsible")]
    pub responsible_initials: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub final_comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Standard success envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_warning: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            backup_warning: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_backup_warning(mut self, warning: Option<String>) -> Self {
        self.backup_warning = warning;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeResponse {
    pub success: bool,
    pub data: Repair,
    pub email_sent: bool,
    pub email_message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub success: bool,
    pub invoice_number: String,
    pub data: Repair,
    pub email_sent: bool,
    pub email_message: String,
}

impl StatusChangeResponse {
    pub fn new(data: Repair, notification: NotificationOutcome) -> Self {
        Self {
            success: true,
            data,
            email_sent: notification.sent,
            email_message: notification.message,
        }
    }
}

impl InvoiceResponse {
    pub fn new(invoice_number: String, data: Repair, notification: NotificationOutcome) -> Self {
        Self {
            success: true,
            invoice_number,
            data,
            email_sent: notification.sent,
            email_message: notification.message,
        }
    }
}
