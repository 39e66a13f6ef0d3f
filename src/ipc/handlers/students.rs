use crate::gateway::{StudentInput, StudentPatch, Subject};
use crate::grades;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::gateway_err;
use crate::ipc::types::{AppState, Request, StudentsCache};
use serde_json::json;

/// Seed subjects offered when a semester has no stored result yet.
const COMMON_SUBJECTS: [&str; 12] = [
    "Financial Management",
    "Marketing Management",
    "Human Resource Management",
    "Operations Management",
    "Strategic Management",
    "Business Analytics",
    "Corporate Finance",
    "Investment Management",
    "Business Law",
    "Economics",
    "Organizational Behavior",
    "Project Management",
];
const DEFAULT_SUBJECT_COUNT: usize = 6;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let Some(user_email) = state.session.current().map(|i| i.email.clone()) else {
        return err(&req.id, "not_authenticated", "login first", None);
    };

    match gateway.list_students(&user_email) {
        Ok(students) => {
            state.students_rev += 1;
            let rev = state.students_rev;
            let payload = json!({ "students": students, "rev": rev });
            state.students = Some(StudentsCache { students, rev });
            ok(&req.id, payload)
        }
        Err(e) => gateway_err(&req.id, "Failed to load students", &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(cache) = state.students.as_ref() else {
        return err(
            &req.id,
            "not_loaded",
            "no student list loaded; call students.list first",
            None,
        );
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    match cache.students.iter().find(|s| s.id == student_id) {
        Some(student) => ok(&req.id, json!({ "student": student, "rev": cache.rev })),
        None => err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        ),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let Some(user_email) = state.session.current().map(|i| i.email.clone()) else {
        return err(&req.id, "not_authenticated", "login first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let roll_number = match req.params.get("rollNumber").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing rollNumber", None),
    };
    let stream = match req.params.get("stream").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing stream", None),
    };
    let photo = req
        .params
        .get("photo")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty());
    let current_semester = req
        .params
        .get("currentSemester")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "1".to_string());

    let input = StudentInput {
        name,
        roll_number,
        stream,
        photo,
        current_semester,
    };

    match gateway.create_student(&user_email, &input) {
        Ok(student) => {
            state.students = None;
            ok(&req.id, json!({ "student": student }))
        }
        Err(e) => gateway_err(&req.id, "Failed to add student", &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let Some(user_email) = state.session.current().map(|i| i.email.clone()) else {
        return err(&req.id, "not_authenticated", "login first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let Some(patch_params) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let field = |key: &str| {
        patch_params
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let patch = StudentPatch {
        name: field("name"),
        roll_number: field("rollNumber"),
        stream: field("stream"),
        photo: patch_params
            .get("photo")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        current_semester: field("currentSemester"),
    };
    if patch.is_empty() {
        return err(&req.id, "bad_params", "empty patch", None);
    }

    match gateway.update_student(&user_email, &student_id, &patch) {
        Ok(student) => {
            state.students = None;
            ok(&req.id, json!({ "student": student }))
        }
        Err(e) => gateway_err(&req.id, "Failed to update student", &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let Some(identity) = state.session.current().cloned() else {
        return err(&req.id, "not_authenticated", "login first", None);
    };
    if !identity.role.is_admin() {
        return err(&req.id, "forbidden", "Only admins can delete students", None);
    }
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    match gateway.delete_student(&identity.email, &student_id) {
        Ok(()) => {
            state.students = None;
            ok(&req.id, json!({ "deleted": true }))
        }
        Err(e) => gateway_err(&req.id, "Failed to delete student", &e),
    }
}

fn handle_subjects_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(cache) = state.students.as_ref() else {
        return err(
            &req.id,
            "not_loaded",
            "no student list loaded; call students.list first",
            None,
        );
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let Some(student) = cache.students.iter().find(|s| s.id == student_id) else {
        return err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        );
    };

    let semester = req
        .params
        .get("semester")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            if student.current_semester.is_empty() {
                "1".to_string()
            } else {
                student.current_semester.clone()
            }
        });

    // Grades are derived state: re-derive on read so a stale stored grade
    // can never reach the caller.
    let subjects: Vec<Subject> = match student
        .semester_results
        .iter()
        .find(|sr| sr.semester == semester)
    {
        Some(result) => result
            .subjects
            .iter()
            .map(|s| Subject {
                name: s.name.clone(),
                marks: s.marks,
                grade: grades::letter_for(s.marks).to_string(),
            })
            .collect(),
        None => COMMON_SUBJECTS
            .iter()
            .take(DEFAULT_SUBJECT_COUNT)
            .map(|name| Subject {
                name: (*name).to_string(),
                marks: 0,
                grade: grades::letter_for(0).to_string(),
            })
            .collect(),
    };

    ok(&req.id, json!({ "semester": semester, "subjects": subjects }))
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(gateway) = state.gateway.as_ref() else {
        return err(&req.id, "no_profile", "open a profile first", None);
    };
    let Some(user_email) = state.session.current().map(|i| i.email.clone()) else {
        return err(&req.id, "not_authenticated", "login first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let semester = match req.params.get("semester").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing semester", None),
    };
    let entries = match req.params.get("subjects").and_then(|v| v.as_array()) {
        Some(v) if !v.is_empty() => v,
        _ => {
            return err(
                &req.id,
                "bad_params",
                "subjects must be a non-empty array",
                None,
            )
        }
    };

    // Whatever grade the caller sent is ignored; marks are coerced and the
    // grade is recomputed so the pair can never disagree on the wire.
    let mut subjects = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let name = match entry.get("name").and_then(|v| v.as_str()) {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    "subject name must not be empty",
                    Some(json!({ "index": i })),
                )
            }
        };
        let marks = grades::coerce_marks(entry.get("marks").unwrap_or(&serde_json::Value::Null));
        subjects.push(Subject {
            name,
            marks,
            grade: grades::letter_for(marks).to_string(),
        });
    }

    match gateway.update_subjects(&user_email, &student_id, &semester, &subjects) {
        Ok(()) => {
            state.students = None;
            ok(&req.id, json!({ "updated": true }))
        }
        Err(e) => gateway_err(&req.id, "Failed to update marks", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.get" => Some(handle_get(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.update" => Some(handle_update(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        "subjects.open" => Some(handle_subjects_open(state, req)),
        "subjects.update" => Some(handle_subjects_update(state, req)),
        _ => None,
    }
}
