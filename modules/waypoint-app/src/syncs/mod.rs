//! The travel rule set.

pub mod auth;
pub mod auto;
pub mod costs;
pub mod fallback;
pub mod itinerary;
pub mod polls;
pub mod trips;

use anyhow::Result;
use serde_json::Value;
use waypoint_engine::{lit, Frames, Pattern, Registry, SyncDef, SyncSpec, Template, Vars};

/// Every rule, in registration order. Rules earlier in the list are matched
/// first, so the auth gate answers before any handler runs and the fallback
/// only sees requests nothing else answered.
pub const ALL: &[(&str, SyncDef)] = &[
    ("PassthroughAuth", auth::passthrough_auth),
    // Background wiring
    ("CreateItineraryForTrip", auto::create_itinerary_for_trip),
    ("CreatePollForEvent", auto::create_poll_for_event),
    ("AttachPollToEvent", auto::attach_poll_to_event),
    ("CreateExpenseForApprovedEvent", auto::create_expense_for_approved_event),
    // Trips
    ("CreateTripRequest", trips::create_trip_request),
    ("CreateTripResponse", trips::create_trip_response),
    ("CreateTripResponseError", trips::create_trip_response_error),
    ("DeleteTripRequest", trips::delete_trip_request),
    ("DeleteTripResponse", trips::delete_trip_response),
    ("DeleteTripResponseError", trips::delete_trip_response_error),
    ("GetTripById", trips::get_trip_by_id),
    ("GetTripsByUser", trips::get_trips_by_user),
    ("AddParticipantRequest", trips::add_participant_request),
    ("AddParticipantResponse", trips::add_participant_response),
    ("AddParticipantResponseError", trips::add_participant_response_error),
    ("GetParticipantsInTrip", trips::get_participants_in_trip),
    // Itineraries
    ("CreateItineraryRequest", itinerary::create_itinerary_request),
    ("CreateItineraryResponse", itinerary::create_itinerary_response),
    ("CreateItineraryResponseError", itinerary::create_itinerary_response_error),
    ("AddEventRequest", itinerary::add_event_request),
    ("AddEventResponse", itinerary::add_event_response),
    ("AddEventResponseError", itinerary::add_event_response_error),
    ("ApproveEventRequest", itinerary::approve_event_request),
    ("ApproveEventResponse", itinerary::approve_event_response),
    ("ApproveEventResponseError", itinerary::approve_event_response_error),
    ("FinalizeItineraryRequest", itinerary::finalize_itinerary_request),
    ("FinalizeItineraryResponse", itinerary::finalize_itinerary_response),
    ("FinalizeItineraryResponseError", itinerary::finalize_itinerary_response_error),
    ("GetItineraryByTrip", itinerary::get_itinerary_by_trip),
    ("GetItineraryById", itinerary::get_itinerary_by_id),
    ("GetEventById", itinerary::get_event_by_id),
    ("GetAllEventsForItinerary", itinerary::get_all_events_for_itinerary),
    ("GetApprovedEventsForItinerary", itinerary::get_approved_events_for_itinerary),
    // Polls
    ("CreatePollRequest", polls::create_poll_request),
    ("CreatePollResponse", polls::create_poll_response),
    ("CreatePollResponseError", polls::create_poll_response_error),
    ("AddOptionRequest", polls::add_option_request),
    ("AddOptionResponse", polls::add_option_response),
    ("AddOptionResponseError", polls::add_option_response_error),
    ("ClosePollRequest", polls::close_poll_request),
    ("ClosePollResponse", polls::close_poll_response),
    ("ClosePollResponseError", polls::close_poll_response_error),
    // Costs
    ("AddContributionRequest", costs::add_contribution_request),
    ("AddContributionResponse", costs::add_contribution_response),
    ("AddContributionResponseError", costs::add_contribution_response_error),
    ("RemoveExpenseRequest", costs::remove_expense_request),
    ("RemoveExpenseResponse", costs::remove_expense_response),
    ("RemoveExpenseResponseError", costs::remove_expense_response_error),
    ("GetExpensesByItem", costs::get_expenses_by_item),
    ("GetTotalContributions", costs::get_total_contributions),
    // Last
    ("UnhandledRequest", fallback::unhandled_request),
];

/// `Requesting.request` for one route.
fn request_to(reg: &Registry, path: &str) -> Result<Pattern> {
    Ok(Pattern::new(reg.action("Requesting", "request")?).input("path", lit(path)))
}

fn respond(reg: &Registry) -> Result<Pattern> {
    Ok(Pattern::new(reg.action("Requesting", "respond")?))
}

/// Answer `/{concept}/{query}` with the query's rows. `key` names both the
/// request field and the query input; `answer` names both the query output
/// and the response field. A query with no rows answers `null`.
fn lookup(
    vars: &mut Vars,
    reg: &Registry,
    concept: &str,
    query: &str,
    key: &str,
    answer: &str,
) -> Result<SyncSpec> {
    let [request, given, found] = vars.many(["request", "given", "found"]);
    let source = reg.query(concept, query)?;
    let input = Template::from([(key, given)]);
    let output = Template::from([(answer, found)]);

    Ok(SyncSpec::new()
        .when(
            request_to(reg, &format!("/{concept}/{query}"))?
                .input(key, given)
                .output("request", request),
        )
        .where_fn(move |frames| {
            let (source, input, output) = (source.clone(), input.clone(), output.clone());
            async move {
                let mut answered = Frames::new();
                for frame in frames {
                    let rows = Frames::single(frame.clone())
                        .query(&source, input.clone(), output.clone())
                        .await?;
                    if rows.is_empty() {
                        answered.push(frame.with(found, Value::Null));
                    }
                    for row in rows {
                        answered.push(row);
                    }
                }
                anyhow::Ok(answered)
            }
        })
        .then(respond(reg)?.input("request", request).input(answer, found)))
}
