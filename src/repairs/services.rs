//! Ticket operations, each a read-modify-write over the secure store.

use rand::{distributions::Alphanumeric, Rng};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::notify::{self, templates, NotificationOutcome, Notifier};
use crate::repairs::model::{Repair, RepairStatus};
use crate::repairs::store::{SecureStore, WriteReport};
use crate::repairs::validation::{normalize_phone, NewRepair};

/// Filters for listing. Email and phone match exactly through the stored
/// hashes.
#[derive(Debug, Default, Clone)]
pub struct RepairFilter {
    pub status: Option<RepairStatus>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug)]
pub struct StatusChange {
    pub repair: Repair,
    pub notification: NotificationOutcome,
    pub report: WriteReport,
}

#[derive(Debug)]
pub struct Invoiced {
    pub repair: Repair,
    pub invoice_number: String,
    pub notification: NotificationOutcome,
    pub report: WriteReport,
}

fn log_backup(report: &WriteReport, op: &str) {
    if let Some(w) = &report.backup_warning {
        warn!(%op, warning = %w, "operation persisted without backup");
    }
}

pub fn new_repair_id() -> String {
    format!("repair_{}", Uuid::new_v4().simple())
}

/// `FACT-<unix millis>-<6 uppercase alphanumerics>`.
pub fn new_invoice_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("FACT-{millis}-{suffix}")
}

pub async fn create_repair(
    store: &SecureStore,
    input: NewRepair,
    actor: &str,
) -> AppResult<(Repair, WriteReport)> {
    let now = OffsetDateTime::now_utc();
    let repair = Repair {
        id: new_repair_id(),
        first_name: input.first_name,
        last_name: input.last_name,
        email: input.email,
        phone: input.phone,
        serial_number: input.serial_number,
        fault: input.fault,
        price: input.price,
        return_date: input.return_date,
        responsible_initials: input.responsible_initials,
        status: RepairStatus::Pending,
        status_changed_at: None,
        final_comment: None,
        invoice_sent: false,
        invoice_number: None,
        invoice_sent_at: None,
        created_at: now,
        updated_at: now,
        created_by: actor.to_string(),
        updated_by: None,
    };

    let created = repair.clone();
    let ((), report) = store
        .mutate("before_create", move |records| {
            records.push(repair);
            Ok::<_, AppError>(())
        })
        .await?;
    log_backup(&report, "create");
    info!(repair_id = %created.id, %actor, "repair created");
    Ok((created, report))
}

/// Newest first.
pub async fn list_repairs(store: &SecureStore, filter: &RepairFilter) -> AppResult<Vec<Repair>> {
    let mut repairs = match (&filter.email, &filter.phone) {
        (Some(email), _) => store.find_by_email(email)?,
        (None, Some(phone)) => store.find_by_phone(&normalize_phone(phone))?,
        (None, None) => store.read_all()?,
    };
    if let (Some(_), Some(phone)) = (&filter.email, &filter.phone) {
        repairs.retain(|r| r.phone == normalize_phone(phone));
    }
    if let Some(status) = filter.status {
        repairs.retain(|r| r.status == status);
    }
    repairs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(repairs)
}

/// Persist the new status, then notify the customer. A failed notification
/// is reported in the result and never undoes the status change.
pub async fn change_status(
    store: &SecureStore,
    notifier: &dyn Notifier,
    id: &str,
    status: RepairStatus,
    final_comment: Option<String>,
    actor: &str,
) -> AppResult<StatusChange> {
    let (repair, report) = store
        .mutate("before_status_change", |records| {
            let repair = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| AppError::repair_not_found(id))?;
            let now = OffsetDateTime::now_utc();
            repair.status = status;
            repair.status_changed_at = Some(now);
            repair.updated_at = now;
            repair.updated_by = Some(actor.to_string());
            if final_comment.is_some() {
                repair.final_comment = final_comment;
            }
            Ok::<_, AppError>(repair.clone())
        })
        .await?;
    log_backup(&report, "status");
    info!(repair_id = %id, %status, %actor, "repair status changed");

    let notification = notify::deliver(
        notifier,
        templates::status_email(&repair),
        &format!("{status} status"),
    )
    .await;

    Ok(StatusChange {
        repair,
        notification,
        report,
    })
}

pub async fn delete_repair(store: &SecureStore, id: &str, actor: &str) -> AppResult<WriteReport> {
    let ((), report) = store
        .mutate("before_delete", |records| {
            let before = records.len();
            records.retain(|r| r.id != id);
            if records.len() == before {
                return Err(AppError::repair_not_found(id));
            }
            Ok(())
        })
        .await?;
    log_backup(&report, "delete");
    info!(repair_id = %id, %actor, "repair deleted");
    Ok(report)
}

/// Issue an invoice for a finished ticket and email it. The invoice is
/// recorded even if the email cannot be delivered.
pub async fn issue_invoice(
    store: &SecureStore,
    notifier: &dyn Notifier,
    id: &str,
    actor: &str,
) -> AppResult<Invoiced> {
    let ((repair, invoice_number), report) = store
        .mutate("before_invoice", |records| {
            let mut number = new_invoice_number();
            while records
                .iter()
                .any(|r| r.invoice_number.as_deref() == Some(number.as_str()))
            {
                number = new_invoice_number();
            }

            let repair = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| AppError::repair_not_found(id))?;
            if repair.status != RepairStatus::Done {
                return Err(AppError::Conflict(
                    "only finished repairs can be invoiced".into(),
                ));
            }
            if repair.invoice_sent {
                return Err(AppError::Conflict("repair already invoiced".into()));
            }

            let now = OffsetDateTime::now_utc();
            repair.invoice_number = Some(number.clone());
            repair.invoice_sent = true;
            repair.invoice_sent_at = Some(now);
            repair.updated_at = now;
            repair.updated_by = Some(actor.to_string());
            Ok((repair.clone(), number))
        })
        .await?;
    log_backup(&report, "invoice");
    info!(repair_id = %id, %invoice_number, %actor, "invoice issued");

    let notification = notify::deliver(
        notifier,
        Some(templates::invoice_email(&repair, &invoice_number)),
        "invoice",
    )
    .await;

    Ok(Invoiced {
        repair,
        invoice_number,
        notification,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupManager;
    use crate::crypto::FieldCipher;
    use crate::notify::{DisabledNotifier, MemoryNotifier};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SecureStore {
        SecureStore::open(
            dir.path().join("repairs.json"),
            FieldCipher::new(&[5u8; 32]),
            BackupManager::new(dir.path().join("backups"), 10),
        )
        .unwrap()
    }

    fn input() -> NewRepair {
        NewRepair {
            first_name: "Jean".into(),
            last_name: "Dupont".into(),
            email: "jean@x.fr".into(),
            phone: "0601020304".into(),
            serial_number: "SN123".into(),
            fault: "screen broken".into(),
            price: 50.0,
            return_date: "2025-01-01".into(),
            responsible_initials: "AB".into(),
        }
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let (repair, report) = create_repair(&store, input(), "admin").await.unwrap();
        assert_eq!(repair.status, RepairStatus::Pending);
        assert!(repair.id.starts_with("repair_"));
        assert_eq!(repair.created_by, "admin");
        assert!(report.backup.is_some());

        let stored = store.read_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, repair.id);
        assert_eq!(stored[0].email, "jean@x.fr");
    }

    #[tokio::test]
    async fn status_transitions_persist_and_notify() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let notifier = MemoryNotifier::default();
        let (repair, _) = create_repair(&store, input(), "admin").await.unwrap();

        let change = change_status(&store, &notifier, &repair.id, RepairStatus::InProgress, None, "admin")
            .await
            .unwrap();
        assert!(change.repair.status_changed_at.is_some());
        assert!(change.notification.sent);

        let change = change_status(
            &store,
            &notifier,
            &repair.id,
            RepairStatus::Done,
            Some("replaced screen".into()),
            "admin",
        )
        .await
        .unwrap();
        assert_eq!(change.repair.final_comment.as_deref(), Some("replaced screen"));

        let stored = &store.read_all().unwrap()[0];
        assert_eq!(stored.status, RepairStatus::Done);
        assert_eq!(stored.final_comment.as_deref(), Some("replaced screen"));
        assert!(stored.status_changed_at.is_some());
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn failed_notification_still_persists_status() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let (repair, _) = create_repair(&store, input(), "admin").await.unwrap();

        let change = change_status(&store, &DisabledNotifier, &repair.id, RepairStatus::Done, None, "admin")
            .await
            .unwrap();
        assert!(!change.notification.sent);
        assert!(!change.notification.message.is_empty());
        assert_eq!(store.read_all().unwrap()[0].status, RepairStatus::Done);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let err = change_status(&store, &DisabledNotifier, "nope", RepairStatus::Done, None, "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        let err = delete_repair(&store, "nope", "admin").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn invoice_requires_done() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let notifier = MemoryNotifier::default();
        let (repair, _) = create_repair(&store, input(), "admin").await.unwrap();

        let err = issue_invoice(&store, &notifier, &repair.id, "admin").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(!store.read_all().unwrap()[0].invoice_sent);

        change_status(&store, &notifier, &repair.id, RepairStatus::Done, None, "admin")
            .await
            .unwrap();
        let invoiced = issue_invoice(&store, &notifier, &repair.id, "admin").await.unwrap();
        assert!(invoiced.invoice_number.starts_with("FACT-"));
        assert!(invoiced.repair.invoice_sent);

        let stored = &store.read_all().unwrap()[0];
        assert_eq!(stored.invoice_number.as_deref(), Some(invoiced.invoice_number.as_str()));
        assert!(stored.invoice_sent_at.is_some());

        let err = issue_invoice(&store, &notifier, &repair.id, "admin").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn invoice_numbers_are_unique_across_tickets() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let notifier = DisabledNotifier;
        let mut numbers = Vec::new();
        for _ in 0..5 {
            let (repair, _) = create_repair(&store, input(), "admin").await.unwrap();
            change_status(&store, &notifier, &repair.id, RepairStatus::Done, None, "admin")
                .await
                .unwrap();
            let invoiced = issue_invoice(&store, &notifier, &repair.id, "admin").await.unwrap();
            assert!(!invoiced.notification.sent);
            numbers.push(invoiced.invoice_number);
        }
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 5);
    }

    #[tokio::test]
    async fn list_filters_and_sorts_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let (first, _) = create_repair(&store, input(), "admin").await.unwrap();
        let mut other = input();
        other.email = "marie@x.fr".into();
        let (second, _) = create_repair(&store, other, "admin").await.unwrap();
        change_status(&store, &DisabledNotifier, &first.id, RepairStatus::Done, None, "admin")
            .await
            .unwrap();

        let all = list_repairs(&store, &RepairFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        let done = list_repairs(
            &store,
            &RepairFilter {
                status: Some(RepairStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, first.id);

        let by_email = list_repairs(
            &store,
            &RepairFilter {
                email: Some("Marie@x.fr".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].id, second.id);
    }

    #[tokio::test]
    async fn delete_removes_whole_record() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let (repair, _) = create_repair(&store, input(), "admin").await.unwrap();
        delete_repair(&store, &repair.id, "admin").await.unwrap();
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn invoice_number_format() {
        let n = new_invoice_number();
        let parts: Vec<&str> = n.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "FACT");
        assert!(parts[1].parse::<i128>().is_ok());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
