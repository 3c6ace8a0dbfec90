//! Fixtures shared by the connector unit tests.

use chrono::Utc;
use fl_core::{AlertStatus, AlertSummary};

/// Creates an open `card_lost` alert for a customer.
pub fn sample_alert(id: &str, customer_id: &str) -> AlertSummary {
    AlertSummary {
        id: id.to_string(),
        customer_id: customer_id.to_string(),
        suspect_txn_id: format!("txn_{}", id.trim_start_matches("alrt_")),
        alert_type: "card_lost".to_string(),
        status: AlertStatus::Open,
        risk_score: None,
        created_at: Utc::now(),
    }
}

#[test]
fn test_sample_alert() {
    let alert = sample_alert("alrt_001", "cust_017");
    assert_eq!(alert.suspect_txn_id, "txn_001");
    assert_eq!(alert.status, AlertStatus::Open);
}
