use crate::types::PullRequestRecord;

/// The records actually shown for a list, in their original order.
///
/// With `show_hidden` the list is returned unchanged; otherwise every record
/// for which `is_hidden` holds is dropped. The cursor indexes into this.
pub fn visible<'a, F>(
    prs: &'a [PullRequestRecord],
    is_hidden: F,
    show_hidden: bool,
) -> Vec<&'a PullRequestRecord>
where
    F: Fn(u64) -> bool,
{
    if show_hidden {
        return prs.iter().collect();
    }
    prs.iter().filter(|pr| !is_hidden(pr.id)).collect()
}
