//! Session arbiter: interactive or headless.

use crate::argparser::ParsedRequest;

/// Decides whether `req` needs an interactive session.
///
/// Rules are tried in order, the first match wins:
///
/// 1. parse errors: headless, to report them;
/// 2. removals: headless;
/// 3. a listing, help or usage: headless;
/// 4. a bare tree argument: interactive;
/// 5. data given with `-O` or `-i`:
///    * with exports or actions: headless batch run;
///    * with `-C` and `-O`: interactive, the created tree is filled by hand;
///    * with `-C` only: headless create-then-import (see [`resolve`]);
///    * otherwise interactive, to browse the loaded data;
/// 6. nothing given: interactive.
///
/// ```
/// use famtree_core::argparser::{FileSpec, ParsedRequest};
/// use famtree_core::arbiter::need_gui;
///
/// let mut req = ParsedRequest::default();
/// assert!(need_gui(&req));
/// req.imports.push(FileSpec { path: "a.ged".into(), format: None });
/// req.create = Some("New".into());
/// assert!(!need_gui(&req));
/// ```
pub fn need_gui(req: &ParsedRequest) -> bool {
    if !req.errors.is_empty() {
        return false;
    }
    if !req.removes.is_empty() {
        return false;
    }
    if req.wants_list() || req.help || req.usage {
        return false;
    }
    if req.open_gui.is_some() {
        return true;
    }
    if req.open.is_some() || !req.imports.is_empty() {
        if !req.exports.is_empty() || !req.actions.is_empty() {
            return false;
        }
        if req.create.is_some() {
            return req.open.is_some();
        }
        return true;
    }
    true
}

/// Arbitration outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Arbitration {
    /// True for an interactive session.
    pub gui: bool,
    /// The request to dispatch.
    pub request: ParsedRequest,
}

/// Runs [`need_gui`] and applies the one adjustment it implies.
///
/// A headless `-C NAME -i FILE` run opens the tree it creates, so `open`
/// takes the value of `create`.
pub fn resolve(mut request: ParsedRequest) -> Arbitration {
    let gui = need_gui(&request);
    if !gui
        && request.errors.is_empty()
        && request.open.is_none()
        && !request.imports.is_empty()
        && request.exports.is_empty()
        && request.actions.is_empty()
        && request.removes.is_empty()
        && !request.wants_list()
        && !request.help
        && !request.usage
    {
        if let Some(create) = request.create.clone() {
            request.open = Some(create);
        }
    }
    Arbitration { gui, request }
}
