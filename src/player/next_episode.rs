use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::backend::{MediaApiContract, MediaApiError, MediaFile, MediaRequest};
use crate::player::state::PlaybackTarget;
use crate::player::PLAYER_LOG_TARGET;

/// The item that follows `current_id` in server order, if any.
pub fn following_item<'a>(siblings: &'a [MediaFile], current_id: &str) -> Option<&'a MediaFile> {
    let index = siblings.iter().position(|m| m.media_file_id == current_id)?;
    siblings.get(index + 1)
}

/// Walks the listing of `parent` page by page until the item after `current_id`
/// is known or the listing runs out.
async fn list_siblings(
    api: &dyn MediaApiContract,
    parent: &str,
    current_id: &str,
    client_id: &str,
) -> Result<Vec<MediaFile>, MediaApiError> {
    let mut request = MediaRequest::children_of(parent, client_id);
    let mut siblings = Vec::new();
    loop {
        let page = api.list_media(&request).await?;
        let full_page = page.len() >= request.page_size as usize;
        siblings.extend(page);
        if !full_page || following_item(&siblings, current_id).is_some() {
            break;
        }
        match request.next_page() {
            Some(next) => request = next,
            None => {
                warn!(target: PLAYER_LOG_TARGET, "Listing of {} exceeds the last page, stopping", parent);
                break;
            }
        }
    }
    Ok(siblings)
}

/// Looks up the next episode of a series. Lookup failures mean "no next episode".
#[instrument(skip(api, target), fields(media_id = %target.media_id))]
pub async fn resolve_next_episode(
    api: Arc<dyn MediaApiContract>,
    target: &PlaybackTarget,
    client_id: &str,
) -> Option<MediaFile> {
    if !target.is_episode {
        return None;
    }
    let parent = target.parent_path.as_deref()?;

    let siblings = match list_siblings(api.as_ref(), parent, &target.media_id, client_id).await {
        Ok(items) => items,
        Err(e) => {
            warn!(target: PLAYER_LOG_TARGET, "Next episode lookup under {} failed: {}", parent, e);
            return None;
        }
    };

    let next = following_item(&siblings, &target.media_id).cloned();
    debug!(target: PLAYER_LOG_TARGET, "Next episode after {}: {:?}", target.media_id, next.as_ref().map(|m| &m.media_file_id));
    next
}
