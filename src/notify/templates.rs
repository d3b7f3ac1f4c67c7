use super::Email;
use crate::repairs::model::{Repair, RepairStatus};

/// VAT rate applied to invoice totals (prices are stored tax included).
pub const VAT_RATE: f64 = 0.20;

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Customer email for a status change. Moving back to pending sends nothing.
pub fn status_email(repair: &Repair) -> Option<Email> {
    let name = escape_html(&format!("{} {}", repair.first_name, repair.last_name));
    let serial = escape_html(&repair.serial_number);
    let fault = escape_html(&repair.fault);
    let initials = escape_html(&repair.responsible_initials);

    let (subject, body) = match repair.status {
        RepairStatus::Pending => return None,
        RepairStatus::InProgress => (
            format!("Repair in progress - {}", repair.serial_number),
            format!(
                "<h2>Repair in progress</h2>\
                 <p>Hello {name},</p>\
                 <p>Work on your console has started.</p>\
                 <p><strong>Serial number:</strong> {serial}<br>\
                 <strong>Reported fault:</strong> {fault}<br>\
                 <strong>Expected return date:</strong> {date}<br>\
                 <strong>Price:</strong> {price:.2} EUR<br>\
                 <strong>Technician:</strong> {initials}</p>",
                date = escape_html(&repair.return_date),
                price = repair.price,
            ),
        ),
        RepairStatus::Done => {
            let comment = repair
                .final_comment
                .as_deref()
                .map(|c| format!("<br><strong>Comment:</strong> {}", escape_html(c)))
                .unwrap_or_default();
            (
                format!("Repair finished - {}", repair.serial_number),
                format!(
                    "<h2>Repair finished</h2>\
                     <p>Hello {name},</p>\
                     <p>Your console is repaired and ready for pickup.</p>\
                     <p><strong>Serial number:</strong> {serial}<br>\
                     <strong>Repaired fault:</strong> {fault}<br>\
                     <strong>Total price:</strong> {price:.2} EUR<br>\
                     <strong>Technician:</strong> {initials}{comment}</p>",
                    price = repair.price,
                ),
            )
        }
    };

    Some(Email {
        to: repair.email.clone(),
        subject,
        html: wrap(&body),
    })
}

/// Invoice email with the VAT breakdown.
pub fn invoice_email(repair: &Repair, invoice_number: &str) -> Email {
    let net = repair.price / (1.0 + VAT_RATE);
    let vat = repair.price - net;
    let note = repair
        .final_comment
        .as_deref()
        .map(|c| format!("<br><em>Note: {}</em>", escape_html(c)))
        .unwrap_or_default();

    let body = format!(
        "<h2>Invoice {number}</h2>\
         <p><strong>Bill to:</strong> {name}<br>{email}<br>{phone}</p>\
         <p><strong>Serial number:</strong> {serial}<br>\
         <strong>Technician:</strong> {initials}</p>\
         <table>\
         <tr><td>Console repair: {fault}{note}</td><td>{net:.2} EUR</td></tr>\
         <tr><td>Subtotal (excl. VAT)</td><td>{net:.2} EUR</td></tr>\
         <tr><td>VAT (20%)</td><td>{vat:.2} EUR</td></tr>\
         <tr><td><strong>Total (incl. VAT)</strong></td><td><strong>{total:.2} EUR</strong></td></tr>\
         </table>\
         <p>Payment due on pickup. Repairs are guaranteed for 3 months.</p>",
        number = escape_html(invoice_number),
        name = escape_html(&format!("{} {}", repair.first_name, repair.last_name)),
        email = escape_html(&repair.email),
        phone = escape_html(&repair.phone),
        serial = escape_html(&repair.serial_number),
        initials = escape_html(&repair.responsible_initials),
        fault = escape_html(&repair.fault),
        total = repair.price,
    );

    Email {
        to: repair.email.clone(),
        subject: format!("Repair invoice {} - {}", invoice_number, repair.serial_number),
        html: wrap(&body),
    }
}

fn wrap(body: &str) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">{body}\
         <p>Regards,<br>The repair workshop</p></div>"
    )
}
