//! Which routes call concepts directly and which go through rules.
//! Paths are relative to the requesting base URL.

use waypoint_requesting::PassthroughRoutes;

/// Route → why it is safe to call directly.
pub const INCLUSIONS: &[(&str, &str)] = &[
    ("/Session/create", "sessions for auth"),
    ("/Session/validate", "sessions for auth"),
    ("/Session/destroy", "sessions for auth"),
    ("/Requesting/request", "requests are public"),
    ("/Requesting/_awaitResponse", "requests are public"),
    ("/Requesting/_getResponse", "requests are public"),
    ("/Polling/_getPoll", "polls are public"),
    ("/Polling/addVote", "anyone with the poll id may vote"),
];

/// Routes served by rules. All of them require a logged-in user.
pub const EXCLUSIONS: &[&str] = &[
    "/Requesting/respond",
    "/TripPlanning/create",
    "/TripPlanning/delete",
    "/TripPlanning/addParticipant",
    "/TripPlanning/_getTripById",
    "/TripPlanning/_getTripsByUser",
    "/TripPlanning/_getParticipantsInTrip",
    "/ItineraryPlanner/create",
    "/ItineraryPlanner/addEvent",
    "/ItineraryPlanner/approveEvent",
    "/ItineraryPlanner/attachPollToEvent",
    "/ItineraryPlanner/finalizeItinerary",
    "/ItineraryPlanner/_getItineraryByTrip",
    "/ItineraryPlanner/_getItineraryById",
    "/ItineraryPlanner/_getEventById",
    "/ItineraryPlanner/_getAllEventsForItinerary",
    "/ItineraryPlanner/_getApprovedEventsForItinerary",
    "/Polling/create",
    "/Polling/addOption",
    "/Polling/close",
    "/CostSplitting/create",
    "/CostSplitting/remove",
    "/CostSplitting/addContribution",
    "/CostSplitting/_getExpensesByItem",
    "/CostSplitting/_getTotalContributions",
];

pub fn passthrough_routes(base_url: &str) -> PassthroughRoutes {
    let routes = INCLUSIONS
        .iter()
        .fold(PassthroughRoutes::new(), |routes, (route, why)| {
            routes.include(format!("{base_url}{route}"), *why)
        });
    EXCLUSIONS
        .iter()
        .fold(routes, |routes, route| routes.exclude(format!("{base_url}{route}")))
}

pub fn requires_user(path: &str) -> bool {
    EXCLUSIONS.iter().any(|route| *route == path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_do_not_overlap() {
        for (route, _) in INCLUSIONS {
            assert!(!EXCLUSIONS.contains(route), "{route} is both included and excluded");
        }
    }

    #[test]
    fn table_is_prefixed_with_base() {
        let routes = passthrough_routes("/api");
        assert_eq!(routes.justification("/api/Session/create"), Some("sessions for auth"));
        assert!(routes.is_excluded("/api", "/TripPlanning/delete"));
        assert_eq!(routes.justification("/Session/create"), None);
    }
}
