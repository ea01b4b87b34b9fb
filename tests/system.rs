extern crate crayon_soundloader;
extern crate rand;

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crayon_soundloader::prelude::*;

use common::*;

#[test]
fn missing_file() {
    let tb = Testbed::headless();
    let loader = tb.shared.loader();

    let h = loader.create_sound_bank_node(&sfx("Bank1", bank(1)), None).unwrap();
    assert_eq!(*wait(&loader.load_sound_bank_async(h)), None);
    assert_eq!(tb.engine.resident_count(), 0);
    assert!(loader.is_empty());
    tb.system.terminate();
}

#[test]
fn engine_refusal() {
    let tb = Testbed::headless();
    tb.stage_bank(1);
    tb.stage_bank(2);
    tb.engine.fail(2);

    let loader = tb.shared.loader();
    let ev = loader
        .create_event_node(&sfx("Event1", event(1, banks(&[1, 2]))), None)
        .unwrap();

    assert_eq!(*wait(&loader.load_event_async(ev)), None);
    assert_eq!(tb.engine.resident_count(), 0);
    assert_eq!(tb.engine.load_count(BANK, 1), 1);
    tb.system.terminate();
}

#[test]
fn unload_deferred_while_in_use() {
    let tb = Testbed::headless();
    tb.stage_bank(1);

    let loader = tb.shared.loader();
    let h = loader.create_sound_bank_node(&sfx("Bank1", bank(1)), None).unwrap();
    assert!(wait(&loader.load_sound_bank_async(h)).is_some());

    tb.engine.set_in_use(true);
    let unloaded = loader.unload_sound_bank_async(h);
    assert!(!unloaded.is_ready());
    assert!(tb.engine.is_resident(BANK, 1));

    // Still in use after one pass.
    tb.pump.pump();
    assert!(!unloaded.is_ready());

    tb.engine.set_in_use(false);
    tb.pump_all();
    wait(&unloaded);
    assert_eq!(tb.engine.resident_count(), 0);
    tb.system.terminate();
}

#[test]
fn events_across_threads() {
    let tb = Testbed::threaded();
    let shared = tb.shared.clone();

    let sets: Vec<ResourceSet> = (0..4)
        .map(|i| ResourceSet {
            sound_banks: vec![bank(1), bank(10 + i)],
            media: vec![media(100), media(110 + i)],
            external_sources: vec![external(200)],
        })
        .collect();

    for v in &sets {
        tb.stage_set(v);
    }

    let workers: Vec<_> = sets
        .into_iter()
        .enumerate()
        .map(|(i, set)| {
            let shared = shared.clone();
            thread::spawn(move || {
                let loader = shared.loader();
                let cooked = sfx("Event", event(i as ShortId, set));

                for _ in 0..16 {
                    let ev = loader.create_event_node(&cooked, None).unwrap();
                    let loaded = loader.load_event_async(ev);
                    if rand::random() {
                        assert!(wait(&loaded).is_some());
                    }

                    wait(&loader.unload_event_async(ev));
                }
            })
        })
        .collect();

    for v in workers {
        v.join().unwrap();
    }

    // Files shared by every event are back to zero along with the rest.
    for _ in 0..100 {
        tb.pump_all();
        if tb.engine.resident_count() == 0 {
            break;
        }

        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(tb.engine.resident_count(), 0);
    assert_eq!(tb.engine.double_loads(), 0);
    assert!(shared.loader().is_empty());
    tb.system.terminate();
}

#[test]
fn settings_from_reader() {
    let json = br#"{ "workers": 2, "platform": "Linux", "reload_language": "Safe" }"#;
    let settings = LoaderSettings::from_reader(&json[..]).unwrap();
    assert_eq!(settings.workers, 2);
    assert_eq!(settings.platform, "Linux");
    assert_eq!(settings.reload_language, ReloadLanguage::Safe);

    let system = SoundResourceSystem::new(
        settings,
        Arc::new(Memory::new()),
        MockEngine::new(),
        Arc::new(FramePump::new()),
    )
    .unwrap();

    assert_eq!(system.shared().settings().platform, "Linux");
    assert!(system.shared().loader().is_empty());
    system.terminate();
}
