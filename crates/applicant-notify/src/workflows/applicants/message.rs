use super::domain::{
    DraftError, IncrementRecord, NotificationDraft, Priority, COMPANY_LEVEL_RECIPIENT,
    NEW_APPLICATION_KIND,
};

/// Body text shown to the employer for a positive delta.
pub fn increment_body(title: &str, new_applicants: u32, current_total: u32) -> String {
    if new_applicants == 1 {
        format!("You have 1 new application in '{title}'. Total: {current_total}")
    } else {
        format!(
            "You have {new_applicants} new applications in '{title}'. Total: {current_total}"
        )
    }
}

/// Company-level notification announcing the applicants behind one increment.
pub fn increment_notification(increment: &IncrementRecord) -> Result<NotificationDraft, DraftError> {
    let draft = NotificationDraft::new(
        COMPANY_LEVEL_RECIPIENT,
        increment.company_id,
        NEW_APPLICATION_KIND,
        format!("New applications in {}", increment.title),
        increment_body(
            &increment.title,
            increment.new_applicants,
            increment.current_total,
        ),
        increment.posting_id,
    )?;

    Ok(draft
        .with_priority(Priority::Medium)
        .with_extra_data(format!(
            "new:{},total:{}",
            increment.new_applicants, increment.current_total
        )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::applicants::domain::{CompanyId, PostingId};

    fn increment(new_applicants: u32, current_total: u32) -> IncrementRecord {
        IncrementRecord {
            company_id: CompanyId(1),
            posting_id: PostingId(100),
            title: "Backend Dev".to_string(),
            previous_total: current_total - new_applicants,
            current_total,
            new_applicants,
        }
    }

    #[test]
    fn singular_wording_for_one_applicant() {
        assert_eq!(
            increment_body("Backend Dev", 1, 6),
            "You have 1 new application in 'Backend Dev'. Total: 6"
        );
    }

    #[test]
    fn plural_wording_otherwise() {
        assert_eq!(
            increment_body("Backend Dev", 2, 7),
            "You have 2 new applications in 'Backend Dev'. Total: 7"
        );
    }

    #[test]
    fn draft_targets_the_company_account() {
        let draft = increment_notification(&increment(5, 5)).expect("draft builds");

        assert_eq!(draft.recipient_user_id(), COMPANY_LEVEL_RECIPIENT);
        assert_eq!(draft.recipient_company_id(), CompanyId(1));
        assert_eq!(draft.kind(), NEW_APPLICATION_KIND);
        assert_eq!(draft.subject(), "New applications in Backend Dev");
        assert_eq!(draft.priority(), Some(Priority::Medium));
        assert_eq!(draft.extra_data(), Some("new:5,total:5"));
        assert_eq!(draft.source_posting_id(), PostingId(100));
    }
}
