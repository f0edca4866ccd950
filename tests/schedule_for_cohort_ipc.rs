mod test_support;

use serde_json::json;
use test_support::{request, request_ok, seed_basic, spawn_sidecar};

#[test]
fn enriched_schedule_keeps_declared_member_order() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_basic(&mut stdin, &mut reader);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.forCohort",
        json!({ "cohortId": "k1" }),
    );
    let lessons = result
        .get("lessons")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("lessons");
    assert_eq!(lessons.len(), 2);

    let l1 = lessons
        .iter()
        .find(|l| l["id"] == "l1")
        .expect("l1 present");
    assert_eq!(l1["subject"]["short"], "MAT");
    assert_eq!(l1["day"]["short"], "Mon");
    assert_eq!(l1["period"]["period"], 1);
    assert_eq!(l1["period"]["startTime"], "08:00");
    assert_eq!(l1["teachers"][0]["lastName"], "Lovelace");
    assert_eq!(l1["periodsPerWeek"], 3);
    assert_eq!(l1["weeksDefinitionId"], "w1");

    // l2 declared its teachers as [t2, t1]; projection follows that order.
    let l2 = lessons
        .iter()
        .find(|l| l["id"] == "l2")
        .expect("l2 present");
    assert_eq!(l2["teachers"][0]["short"], "TUR");
    assert_eq!(l2["teachers"][1]["short"], "LOV");
    assert_eq!(l2["classrooms"][0]["short"], "GYM");
    assert_eq!(l2["classrooms"][1]["short"], "L2");
}

#[test]
fn cohort_with_zero_lessons_is_success_not_found_is_for_unknown_ids() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_basic(&mut stdin, &mut reader);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.forCohort",
        json!({ "cohortId": "k-empty" }),
    );
    assert_eq!(result["lessons"], json!([]));

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.forCohort",
        json!({ "cohortId": "no-such-cohort" }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "not_found");
}
