use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::crypto::{hash, hash_email, CryptoError, FieldCipher};

/// Lifecycle of a ticket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Pending,
    InProgress,
    Done,
}

impl RepairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::Pending => "pending",
            RepairStatus::InProgress => "in_progress",
            RepairStatus::Done => "done",
        }
    }
}

impl std::str::FromStr for RepairStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RepairStatus::Pending),
            "in_progress" => Ok(RepairStatus::InProgress),
            "done" => Ok(RepairStatus::Done),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

impl std::fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repair ticket with PII in clear text. Only exists in memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Repair {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub serial_number: String,
    pub fault: String,
    pub price: f64,
    pub return_date: String,
    pub responsible_initials: String,
    pub status: RepairStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub status_changed_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub final_comment: Option<String>,
    #[serde(default)]
    pub invoice_sent: bool,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub invoice_sent_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub created_by: String,
    #[serde(default)]
    pub updated_by: Option<String>,
}

/// On-disk form of a [`Repair`]: email and phone encrypted, each paired with
/// a lookup hash. `status` is optional so records written before statuses
/// existed still load; the store backfills it on open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredRepair {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub email_hash: String,
    pub phone: String,
    pub phone_hash: String,
    pub serial_number: String,
    pub fault: String,
    pub price: f64,
    pub return_date: String,
    pub responsible_initials: String,
    #[serde(default)]
    pub status: Option<RepairStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub status_changed_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub final_comment: Option<String>,
    #[serde(default)]
    pub invoice_sent: bool,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub invoice_sent_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl StoredRepair {
    /// Encrypt PII and recompute both hashes from the same plaintext.
    pub fn seal(repair: &Repair, cipher: &FieldCipher) -> Result<Self, CryptoError> {
        Ok(Self {
            id: repair.id.clone(),
            first_name: repair.first_name.clone(),
            last_name: repair.last_name.clone(),
            email: cipher.encrypt(&repair.email)?,
            email_hash: hash_email(&repair.email),
            phone: cipher.encrypt(&repair.phone)?,
            phone_hash: hash(&repair.phone),
            serial_number: repair.serial_number.clone(),
            fault: repair.fault.clone(),
            price: repair.price,
            return_date: repair.return_date.clone(),
            responsible_initials: repair.responsible_initials.clone(),
            status: Some(repair.status),
            status_changed_at: repair.status_changed_at,
            final_comment: repair.final_comment.clone(),
            invoice_sent: repair.invoice_sent,
            invoice_number: repair.invoice_number.clone(),
            invoice_sent_at: repair.invoice_sent_at,
            created_at: repair.created_at,
            updated_at: repair.updated_at,
            created_by: repair.created_by.clone(),
            updated_by: repair.updated_by.clone(),
        })
    }

    pub fn open(self, cipher: &FieldCipher) -> Result<Repair, CryptoError> {
        Ok(Repair {
            email: cipher.decrypt(&self.email)?,
            phone: cipher.decrypt(&self.phone)?,
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            serial_number: self.serial_number,
            fault: self.fault,
            price: self.price,
            return_date: self.return_date,
            responsible_initials: self.responsible_initials,
            status: self.status.unwrap_or(RepairStatus::Pending),
            status_changed_at: self.status_changed_at,
            final_comment: self.final_comment,
            invoice_sent: self.invoice_sent,
            invoice_number: self.invoice_number,
            invoice_sent_at: self.invoice_sent_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: self.created_by,
            updated_by: self.updated_by,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_repair(id: &str) -> Repair {
    let now = OffsetDateTime::now_utc();
    Repair {
        id: id.to_string(),
        first_name: "Jean".into(),
        last_name: "Dupont".into(),
        email: "jean@x.fr".into(),
        phone: "0601020304".into(),
        serial_number: "SN123".into(),
        fault: "screen broken".into(),
        price: 50.0,
        return_date: "2025-01-01".into(),
        responsible_initials: "AB".into(),
        status: RepairStatus::Pending,
        status_changed_at: None,
        final_comment: None,
        invoice_sent: false,
        invoice_number: None,
        invoice_sent_at: None,
        created_at: now,
        updated_at: now,
        created_by: "admin".into(),
        updated_by: None,
    }
}
