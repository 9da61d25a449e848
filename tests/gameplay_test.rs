// Whole-story scenarios run through the public interpreter API on a headless display
mod common;

use test_log::test;
use zcore::display_headless::HeadlessDisplay;
use zcore::display_trait::Key;
use common::{interpreter, StoryBuilder, CODE, GLOBALS, SCRATCH};
use zcore::{Game, Interpreter, InterpreterConfig, RunOutcome};

fn global(interp: &Interpreter, n: u32) -> u16 {
    interp.vm.game.read_word(GLOBALS as u32 + 2 * n)
}

#[test]
fn test_v3_turn_draws_status_and_parses_command() {
    let mut story = StoryBuilder::new(3);
    story
        .object(1, 0, 0, 0)
        .properties_named(1, "Kitchen", &[])
        .global(0, 1)
        .global(1, 5)
        .global(2, 7);
    story.dictionary(b",", &["open", "door"]);
    story.bytes(SCRATCH, &[20]);
    story.bytes(SCRATCH + 0x40, &[4]);
    let text = (SCRATCH as u16).to_be_bytes();
    let parse = ((SCRATCH + 0x40) as u16).to_be_bytes();

    // print_paddr hello; sread text parse; loadb parse #1 -> G03; quit
    story.code(&[
        0x8d, 0, 0, 0xe4, 0x0f, text[0], text[1], parse[0], parse[1], 0xd0, 0x1f, parse[0],
        parse[1], 1, 0x13, 0xba,
    ]);
    let hello = story.string("hello");
    story.bytes(CODE + 1, &hello.to_be_bytes());

    let (mut interp, handle) = interpreter(&story);
    handle.push_line("Open the door");

    assert_eq!(interp.run().unwrap(), RunOutcome::Quit);
    assert!(handle.main_text().starts_with("hello"));
    assert_eq!(global(&interp, 3), 3);

    let parse = SCRATCH as u32 + 0x40;
    let game = &interp.vm.game;
    assert_eq!(game.read_word(parse + 2), story.dictionary_entry("open"));
    // "the" is not in the dictionary
    assert_eq!(game.read_word(parse + 6), 0);
    assert_eq!(game.read_word(parse + 10), story.dictionary_entry("door"));

    let status = &handle.grid_lines()[0];
    assert!(status.starts_with("Kitchen"));
    assert!(status.ends_with(" 5/7"));
}

#[test]
fn test_saved_game_restores_in_a_new_session() {
    let mut story = StoryBuilder::new(5);
    // session one: store G03 #0x55; save -> G00; quit
    story.code(&[0x0d, 0x13, 0x55, 0xbe, 0x00, 0xff, 0x10, 0xba]);
    // session two: restore -> G02; quit
    let restore_at = story.code(&[0xbe, 0x01, 0xff, 0x12, 0xba]);

    let (mut first, first_handle) = interpreter(&story);
    assert_eq!(first.run().unwrap(), RunOutcome::Quit);
    assert_eq!(global(&first, 0), 1);
    let saved = first_handle.file("story.qzl").expect("save written");

    story.initial_pc(restore_at);
    let (mut second, second_handle) = interpreter(&story);
    second_handle.put_file("story.qzl", saved);
    assert_eq!(second.run().unwrap(), RunOutcome::Quit);

    // execution resumed after the save instruction with 2 stored
    assert_eq!(global(&second, 0), 2);
    assert_eq!(global(&second, 3), 0x55);
    assert_eq!(global(&second, 2), 0);
}

#[test]
fn test_undo_ring_keeps_most_recent_states() {
    let mut story = StoryBuilder::new(5);
    // save_undo -> G00 three times, then restore_undo -> G01
    story.code(&[
        0xbe, 0x09, 0xff, 0x10, 0xbe, 0x09, 0xff, 0x10, 0xbe, 0x09, 0xff, 0x10, 0xbe, 0x0a,
        0xff, 0x11,
    ]);
    let config = InterpreterConfig {
        undo_slots: 2,
        random_seed: Some(1),
        ..InterpreterConfig::default()
    };
    let game = Game::from_memory(story.build()).unwrap();
    let mut interp =
        Interpreter::new(game, Box::new(HeadlessDisplay::new(40, 10)), config).unwrap();

    for _ in 0..3 {
        interp.step().unwrap();
    }
    assert_eq!(global(&interp, 0), 1);
    assert_eq!(interp.undo.len(), 2);

    interp.step().unwrap();
    assert_eq!(global(&interp, 0), 2);
    assert_eq!(interp.vm.pc, CODE as u32 + 12);
    assert_eq!(interp.undo.len(), 1);
}

#[test]
fn test_timed_read_char_suspends_and_resumes() {
    let mut story = StoryBuilder::new(5);
    // read_char #1 #10 routine -> G00; quit
    story.code(&[0xf6, 0x53, 1, 10, 0, 0, 0x10, 0xba]);
    // routine: print "tick"; rfalse
    let routine = story.routine(&[], &[0xb2, 0x65, 0xc8, 0xc0, 0xa5, 0xb1]);
    story.bytes(CODE + 4, &routine.to_be_bytes());

    let (mut interp, handle) = interpreter(&story);
    handle.push_timer();
    assert_eq!(interp.run().unwrap(), RunOutcome::Suspended);
    assert_eq!(handle.main_text(), "tick");
    assert_eq!(handle.timer_millis(), 1000);
    assert_eq!(interp.vm.pc, CODE as u32);

    handle.push_key(Key::Char('y'));
    assert_eq!(interp.run().unwrap(), RunOutcome::Quit);
    assert_eq!(global(&interp, 0), b'y' as u16);
    assert_eq!(handle.timer_millis(), 0);
}

#[test]
fn test_arithmetic_error_names_instruction() {
    let mut story = StoryBuilder::new(5);
    // div #1 #0 -> G00
    story.code(&[0x17, 1, 0, 0x10]);
    let (mut interp, _) = interpreter(&story);
    let err = interp.run().unwrap_err();
    assert!(err.is_arithmetic());
    let message = err.to_string();
    assert!(message.contains("div"), "{}", message);
}

#[test]
fn test_unknown_opcode_is_fatal() {
    let mut story = StoryBuilder::new(3);
    // EXT opcodes do not exist before v5
    story.code(&[0xbe, 0x02, 0x5f, 1, 1, 0x10]);
    let (mut interp, _) = interpreter(&story);
    assert!(interp.run().is_err());
}
