//! Problem reports for questions that could not be answered

use serde_json::json;
use starchat_common::{DidCommMessage, HandlerError};
use uuid::Uuid;

pub const PROBLEM_REPORT_MESSAGE_TYPE: &str =
    "https://didcomm.org/report-problem/2.0/problem-report";

/// Report from `sender` back to the question's author, parented on `thid`
pub fn build_problem_report(
    sender_did_url: &str,
    recipient_did_url: &str,
    thid: &str,
    error: &HandlerError,
) -> DidCommMessage {
    DidCommMessage {
        message_type: PROBLEM_REPORT_MESSAGE_TYPE.to_string(),
        from: sender_did_url.to_string(),
        to: recipient_did_url.to_string(),
        id: Uuid::new_v4().to_string(),
        thid: None,
        pthid: Some(thid.to_string()),
        body: json!({
            "code": error.problem_code(),
            "comment": error.to_string(),
        }),
        attachments: None,
        return_route: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starchat_common::{InvalidMessageError, RetrievalError};

    #[test]
    fn test_report_for_retrieval_failure() {
        let err = HandlerError::from(RetrievalError::EmptyResponse);
        let report = build_problem_report("did:peer:B", "did:peer:A", "thid1", &err);

        assert_eq!(report.message_type, PROBLEM_REPORT_MESSAGE_TYPE);
        assert_eq!(report.pthid.as_deref(), Some("thid1"));
        assert_eq!(report.to, "did:peer:A");
        assert_eq!(report.body["code"], "e.p.me.res");
        assert_eq!(report.body["comment"], "Inference endpoint returned no generations");
    }

    #[test]
    fn test_report_for_invalid_field() {
        let err = HandlerError::from(InvalidMessageError::new("Starchat", "body.queryInput"));
        let report = build_problem_report("did:peer:B", "did:peer:A", "thid1", &err);
        assert_eq!(report.body["code"], "e.p.msg.invalid-field");
    }
}
