mod test_support;

use serde_json::json;
use test_support::{request, request_ok, seed_basic, spawn_sidecar};

#[test]
fn updating_lesson_ids_replaces_the_set_with_no_residual_links() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_basic(&mut stdin, &mut reader);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "movedLessons.create",
        json!({
            "date": "2025-03-10",
            "newPeriodId": "p2",
            "newClassroomId": "r2",
            "lessonIds": ["l1", "l2"]
        }),
    );
    let id = created["movedLesson"]["id"]
        .as_str()
        .expect("id")
        .to_string();
    assert_eq!(created["movedLesson"]["lessons"], json!(["l1", "l2"]));
    assert_eq!(created["movedLesson"]["period"]["period"], 2);
    assert_eq!(created["movedLesson"]["classroom"]["short"], "GYM");
    // Unmoved positional field reads as null, meaning "unchanged from base".
    assert!(created["movedLesson"]["day"].is_null());

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "movedLessons.update",
        json!({ "id": id, "patch": { "lessonIds": ["l3"] } }),
    );
    assert_eq!(updated["movedLesson"]["lessons"], json!(["l3"]));

    // Read back through the aggregate view as well.
    let all = request_ok(&mut stdin, &mut reader, "3", "movedLessons.getAll", json!({}));
    let rows = all["movedLessons"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["lessons"], json!(["l3"]));
}

#[test]
fn patch_with_null_clears_a_positional_field_and_absent_leaves_links_alone() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_basic(&mut stdin, &mut reader);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "movedLessons.create",
        json!({
            "date": "2025-03-10",
            "newClassroomId": "r2",
            "lessonIds": ["l1"]
        }),
    );
    let id = created["movedLesson"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "movedLessons.update",
        json!({ "id": id, "patch": { "date": "2025-03-11", "newClassroomId": null } }),
    );
    assert_eq!(updated["movedLesson"]["date"], "2025-03-11");
    assert!(updated["movedLesson"]["classroom"].is_null());
    assert_eq!(updated["movedLesson"]["lessons"], json!(["l1"]));
}

#[test]
fn unknown_patch_field_and_unknown_override_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    seed_basic(&mut stdin, &mut reader);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "movedLessons.update",
        json!({ "id": "ghost", "patch": { "date": "2025-03-11" } }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "not_found");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "movedLessons.create",
        json!({ "date": "2025-03-10" }),
    );
    let id = created["movedLesson"]["id"]
        .as_str()
        .expect("id")
        .to_string();
    assert_eq!(created["movedLesson"]["lessons"], json!([]));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "movedLessons.update",
        json!({ "id": id, "patch": { "room": "r2" } }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_params");
}
