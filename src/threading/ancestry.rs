//! Walk a reply chain up to its thread root.

use tokio_util::sync::CancellationToken;

use super::subject::first_reference;
use crate::archive::Archive;
use crate::models::MessageRecord;
use crate::session::Session;

/// Follow In-Reply-To references upward from `record`.
///
/// Each hop extracts the first `<...>` token of the current record's
/// In-Reply-To and looks it up through the archive, so denied parents end the
/// walk exactly like missing ones. The walk also stops on a store error, on
/// cancellation, and after `max_hops` successful hops. The last record
/// reached is returned; the walk never fails.
pub async fn find_root(
    archive: &Archive,
    session: &Session,
    record: MessageRecord,
    cancel: &CancellationToken,
) -> MessageRecord {
    let max_hops = archive.config().traversal.max_hops;
    let mut current = record;

    for hop in 0..max_hops {
        if cancel.is_cancelled() {
            log::debug!("ancestry walk cancelled after {} hops", hop);
            break;
        }

        let Some(reference) = current.in_reply_to.as_deref().and_then(first_reference) else {
            break;
        };

        match archive.email_by_message_id(session, reference).await {
            Ok(Some(parent)) => current = parent,
            Ok(None) => break,
            Err(err) => {
                log::warn!("ancestry walk stopped at {}: {}", current.id, err);
                break;
            }
        }
    }

    current
}
