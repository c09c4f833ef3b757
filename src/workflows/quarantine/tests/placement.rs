use super::common::*;
use crate::workflows::quarantine::domain::{FacilityId, Gender, InfectionStatus, Member, Room};
use crate::workflows::quarantine::label::Label;
use crate::workflows::quarantine::placement::{
    PlacementBasis, PlacementFailure, RankingStage, RoomFinder,
};
use crate::workflows::quarantine::policy::Policy;

fn occupant(id: &str, room: &str, label: Label, gender: Gender, doses: u32) -> Member {
    resident(member(id, gender, label, InfectionStatus::Unknown, doses), room)
}

#[test]
fn single_compatible_room_is_chosen() {
    let policy = Policy::builtin();
    let x = resident(
        member("x", Gender::Female, Label::F1, InfectionStatus::Negative, 0),
        "r1",
    );
    let rooms = vec![snapshot(room("r1", 2), vec![x])];

    let placement = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F1, InfectionStatus::Unknown, 1),
            &rooms,
        )
        .expect("room available");

    assert_eq!(placement.room, room_id("r1"));
    assert_eq!(placement.basis, PlacementBasis::Ranked);
}

#[test]
fn rooms_whose_occupants_all_settled_are_closed() {
    let mut policy = Policy::builtin();
    policy.close_room_after_days = 1;
    let mut settled = occupant("s", "r1", Label::F2, Gender::Male, 0);
    settled.quarantine_start = Some(now() - days(2));
    let only_room = vec![snapshot(room("r1", 4), vec![settled.clone()])];

    let err = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F2, InfectionStatus::Unknown, 0),
            &only_room,
        )
        .expect_err("only room is closed");
    assert_eq!(err, PlacementFailure::AllRoomsClosed);

    let with_spare = vec![
        snapshot(room("r1", 4), vec![settled]),
        snapshot(room("r2", 4), Vec::new()),
    ];
    let placement = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F2, InfectionStatus::Unknown, 0),
            &with_spare,
        )
        .expect("empty room stays open");
    assert_eq!(placement.room, room_id("r2"));
}

#[test]
fn positive_subjects_ignore_closed_rooms() {
    let policy = Policy::builtin();
    let mut settled = occupant("s", "r1", Label::F2, Gender::Male, 0);
    settled.quarantine_start = Some(now() - days(5));
    let rooms = vec![
        snapshot(room("r1", 4), vec![settled]),
        snapshot(room("r2", 4), Vec::new()),
    ];

    let placement = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F0, InfectionStatus::Positive, 0),
            &rooms,
        )
        .expect("positive subject placed");

    assert_eq!(placement.room, room_id("r1"), "dose distance 0 beats empty room");
    assert!(placement
        .trail
        .iter()
        .all(|stage| stage.stage != RankingStage::ClosedRooms));
}

#[test]
fn preferred_room_is_kept_even_when_another_ranks_higher() {
    let policy = Policy::builtin();
    let rooms = vec![
        snapshot(
            room("r1", 4),
            vec![occupant("a", "r1", Label::F1, Gender::Male, 1)],
        ),
        snapshot(room("r2", 4), Vec::new()),
    ];
    let mut request = request(Gender::Male, Label::F1, InfectionStatus::Unknown, 1);
    request.preferred_room = Some(room_id("r2"));

    let placement = RoomFinder::new(&policy, now())
        .find(&request, &rooms)
        .expect("preferred room kept");

    assert_eq!(placement.room, room_id("r2"));
    assert_eq!(placement.basis, PlacementBasis::KeptCurrentRoom);
    assert_eq!(placement.trail[0].stage, RankingStage::Stability);
}

#[test]
fn subject_does_not_count_against_their_own_room() {
    let policy = Policy::builtin();
    let me = occupant("me", "r1", Label::F2, Gender::Female, 0);
    let rooms = vec![
        snapshot(room("r1", 1), vec![me.clone()]),
        snapshot(room("r2", 2), Vec::new()),
    ];
    let mut request = request(Gender::Female, Label::F2, InfectionStatus::Unknown, 0);
    request.subject = Some(me.id.clone());
    request.preferred_room = Some(room_id("r1"));

    let placement = RoomFinder::new(&policy, now())
        .find(&request, &rooms)
        .expect("own seat is free");

    assert_eq!(placement.room, room_id("r1"));
    assert_eq!(placement.basis, PlacementBasis::KeptCurrentRoom);
}

#[test]
fn preferred_room_is_skipped_when_excluded_full_or_incompatible() {
    let policy = Policy::builtin();
    let negative = resident(
        member("n", Gender::Male, Label::F1, InfectionStatus::Negative, 0),
        "r2",
    );
    let rooms = vec![
        snapshot(
            room("r1", 1),
            vec![occupant("a", "r1", Label::F1, Gender::Male, 0)],
        ),
        snapshot(room("r2", 3), vec![negative]),
        snapshot(room("r3", 3), Vec::new()),
    ];
    let finder = RoomFinder::new(&policy, now());

    let mut full = request(Gender::Male, Label::F1, InfectionStatus::Unknown, 0);
    full.preferred_room = Some(room_id("r1"));
    let placement = finder.find(&full, &rooms).expect("ranked fallback");
    assert_eq!(placement.basis, PlacementBasis::Ranked);
    assert_ne!(placement.room, room_id("r1"));

    let mut incompatible = request(Gender::Male, Label::F0, InfectionStatus::Positive, 0);
    incompatible.preferred_room = Some(room_id("r2"));
    let placement = finder.find(&incompatible, &rooms).expect("ranked fallback");
    assert_eq!(placement.room, room_id("r3"));

    let mut excluded = request(Gender::Male, Label::F1, InfectionStatus::Unknown, 0);
    excluded.preferred_room = Some(room_id("r3"));
    let excluded = excluded.excluding(room_id("r3"));
    let placement = finder.find(&excluded, &rooms).expect("ranked fallback");
    assert_eq!(placement.room, room_id("r2"));
}

#[test]
fn full_facility_reports_no_vacancy() {
    let policy = Policy::builtin();
    let rooms = vec![snapshot(
        room("r1", 1),
        vec![occupant("a", "r1", Label::F1, Gender::Male, 0)],
    )];

    let err = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F1, InfectionStatus::Unknown, 0),
            &rooms,
        )
        .expect_err("no bed left");
    assert_eq!(err, PlacementFailure::NoVacancy);
}

#[test]
fn positive_subject_never_joins_confirmed_negatives() {
    let policy = Policy::builtin();
    let negative = resident(
        member("n", Gender::Male, Label::F1, InfectionStatus::Negative, 0),
        "r1",
    );
    let rooms = vec![snapshot(room("r1", 4), vec![negative])];

    let err = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F0, InfectionStatus::Positive, 0),
            &rooms,
        )
        .expect_err("status conflict");
    assert_eq!(err, PlacementFailure::NoCompatibleStatus);
}

#[test]
fn same_label_outranks_dose_affinity() {
    let policy = Policy::builtin();
    let rooms = vec![
        snapshot(
            room("r1", 4),
            vec![occupant("a", "r1", Label::F2, Gender::Male, 5)],
        ),
        snapshot(
            room("r2", 4),
            vec![occupant("b", "r2", Label::F1, Gender::Male, 1)],
        ),
    ];

    let placement = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F2, InfectionStatus::Unknown, 1),
            &rooms,
        )
        .expect("placed");
    assert_eq!(placement.room, room_id("r1"));
}

#[test]
fn closest_average_dose_wins_and_empty_rooms_average_one() {
    let policy = Policy::builtin();
    let rooms = vec![
        snapshot(
            room("r1", 4),
            vec![occupant("a", "r1", Label::F3, Gender::Male, 3)],
        ),
        snapshot(room("r2", 4), Vec::new()),
    ];

    let placement = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F1, InfectionStatus::Unknown, 1),
            &rooms,
        )
        .expect("placed");
    assert_eq!(placement.room, room_id("r2"));

    let rooms = vec![
        snapshot(
            room("r1", 4),
            vec![occupant("a", "r1", Label::F1, Gender::Male, 3)],
        ),
        snapshot(
            room("r2", 4),
            vec![occupant("b", "r2", Label::F1, Gender::Male, 1)],
        ),
    ];
    let placement = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F1, InfectionStatus::Unknown, 1),
            &rooms,
        )
        .expect("placed");
    assert_eq!(placement.room, room_id("r2"));
}

#[test]
fn same_gender_then_fullest_room_break_ties() {
    let policy = Policy::builtin();
    let rooms = vec![
        snapshot(
            room("r1", 4),
            vec![occupant("a", "r1", Label::F1, Gender::Female, 1)],
        ),
        snapshot(
            room("r2", 4),
            vec![occupant("b", "r2", Label::F1, Gender::Male, 1)],
        ),
    ];
    let placement = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F1, InfectionStatus::Unknown, 1),
            &rooms,
        )
        .expect("placed");
    assert_eq!(placement.room, room_id("r2"));

    let rooms = vec![
        snapshot(
            room("r1", 4),
            vec![occupant("a", "r1", Label::F1, Gender::Male, 1)],
        ),
        snapshot(
            room("r2", 2),
            vec![occupant("b", "r2", Label::F1, Gender::Male, 1)],
        ),
    ];
    let placement = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F1, InfectionStatus::Unknown, 1),
            &rooms,
        )
        .expect("placed");
    assert_eq!(placement.room, room_id("r2"), "fullest room packs first");
}

#[test]
fn lowest_room_id_breaks_final_ties_and_trail_lists_every_stage() {
    let policy = Policy::builtin();
    let rooms = vec![
        snapshot(room("b", 2), Vec::new()),
        snapshot(room("a", 2), Vec::new()),
    ];

    let placement = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Other, Label::Abroad, InfectionStatus::Unknown, 0),
            &rooms,
        )
        .expect("placed");

    assert_eq!(placement.room, room_id("a"));
    let stages: Vec<RankingStage> = placement.trail.iter().map(|stage| stage.stage).collect();
    assert_eq!(
        stages,
        vec![
            RankingStage::Vacancy,
            RankingStage::StatusCompatibility,
            RankingStage::ClosedRooms,
            RankingStage::SameLabel,
            RankingStage::DoseAffinity,
            RankingStage::SameGender,
            RankingStage::Packing,
            RankingStage::RoomOrder,
        ]
    );
    assert!(placement.summary().starts_with("ranked into a"));
}

#[test]
fn search_is_deterministic_regardless_of_input_order() {
    let policy = Policy::builtin();
    let mut rooms = vec![
        snapshot(
            room("r1", 3),
            vec![occupant("a", "r1", Label::F2, Gender::Female, 2)],
        ),
        snapshot(
            room("r2", 3),
            vec![occupant("b", "r2", Label::F2, Gender::Female, 2)],
        ),
        snapshot(room("r3", 3), Vec::new()),
    ];
    let subject = request(Gender::Female, Label::F2, InfectionStatus::Unknown, 2);
    let finder = RoomFinder::new(&policy, now());

    let first = finder.find(&subject, &rooms).expect("placed");
    let again = finder.find(&subject, &rooms).expect("placed");
    rooms.reverse();
    let reversed = finder.find(&subject, &rooms).expect("placed");

    assert_eq!(first, again);
    assert_eq!(first, reversed);
    assert_eq!(first.room, room_id("r1"));
}

#[test]
fn rooms_of_other_facilities_are_ignored() {
    let policy = Policy::builtin();
    let foreign = Room {
        facility: FacilityId("ward-b".to_string()),
        ..room("r0", 4)
    };
    let rooms = vec![snapshot(foreign, Vec::new())];

    let err = RoomFinder::new(&policy, now())
        .find(
            &request(Gender::Male, Label::F1, InfectionStatus::Unknown, 0),
            &rooms,
        )
        .expect_err("no room in this ward");
    assert_eq!(err, PlacementFailure::NoVacancy);
}
