use anyhow::Result;
use waypoint_engine::{lit, Pattern, Registry, SyncSpec, Vars};

use crate::routes;

/// Excluded routes require a verified user. Requests without one are
/// answered 401 before any handler rule gets to respond.
pub fn passthrough_auth(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, path, user] = vars.many(["request", "path", "user"]);
    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("Requesting", "request")?)
                .input("path", path)
                .input("user", user)
                .output("request", request),
        )
        .where_fn(move |frames| async move {
            anyhow::Ok(frames.filter(|f| {
                f.get_str(path).is_some_and(routes::requires_user) && !f.is_present(user)
            }))
        })
        .then(
            super::respond(reg)?
                .input("request", request)
                .input("error", lit("Unauthorized"))
                .input("status", lit(401)),
        ))
}
