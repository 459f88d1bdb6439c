//! Seeded randomized convergence: two replicas edit concurrently, exchange
//! change packs, and must render byte-identical documents every round.

use yorkie_core::change::{ChangePack, Checkpoint};
use yorkie_core::time::ActorID;
use yorkie_core::Document;
use yorkie_util::fuzzer::Fuzzer;

fn actor(b: u8) -> ActorID {
    ActorID::from_bytes([b; 12])
}

fn replication_pack(doc: &Document) -> ChangePack {
    ChangePack::new(
        doc.key().to_string(),
        Checkpoint::INITIAL,
        doc.create_change_pack().changes().to_vec(),
        None,
    )
}

fn random_batch(doc: &mut Document, fuzzer: &Fuzzer, round: usize) {
    let ops = fuzzer.random_int(1, 3);
    doc.update(
        |root| {
            for _ in 0..ops {
                if fuzzer.random_bool(0.6) {
                    let mut text = root.get_text("text")?;
                    let len = text.len() as i64;
                    let from = fuzzer.random_int(0, len) as usize;
                    let to = fuzzer.random_int(from as i64, len) as usize;
                    let content = if fuzzer.random_bool(0.7) {
                        fuzzer.random_string(fuzzer.random_int(1, 5) as usize, "abcdefgh ")
                    } else {
                        String::new()
                    };
                    text.edit(from, to, &content)?;
                } else {
                    let mut list = root.get_array("list")?;
                    if list.is_empty() || fuzzer.random_bool(0.7) {
                        list.add_integer(fuzzer.random_int(0, 99) as i32)?;
                    } else {
                        let index = fuzzer.random_int(0, list.len() as i64 - 1) as usize;
                        list.delete(index)?;
                    }
                }
            }
            Ok(())
        },
        &format!("round {round}"),
    )
    .unwrap();
}

#[test]
fn randomized_replicas_converge_every_round() {
    let fuzzer = Fuzzer::new(Some([11; 32]));
    let mut doc_a = Document::with_actor("fuzz", actor(1));
    let mut doc_b = Document::with_actor("fuzz", actor(2));

    doc_a
        .update(
            |root| {
                root.set_new_text("text")?;
                root.set_new_array("list")?;
                Ok(())
            },
            "bootstrap",
        )
        .unwrap();
    doc_b.apply_change_pack(&replication_pack(&doc_a)).unwrap();

    // An observer that only ever receives packs, with every delivery
    // repeating the full history so far. Duplicates must be harmless.
    let mut observer = Document::with_actor("fuzz", actor(3));
    observer
        .apply_change_pack(&replication_pack(&doc_a))
        .unwrap();

    for round in 0..12 {
        random_batch(&mut doc_a, &fuzzer, round);
        random_batch(&mut doc_b, &fuzzer, round);

        let pack_a = replication_pack(&doc_a);
        let pack_b = replication_pack(&doc_b);
        doc_b.apply_change_pack(&pack_a).unwrap();
        doc_a.apply_change_pack(&pack_b).unwrap();

        assert_eq!(
            doc_a.marshal(),
            doc_b.marshal(),
            "replicas diverged in round {round} (seed {:?})",
            fuzzer.seed,
        );

        observer.apply_change_pack(&pack_a).unwrap();
        observer.apply_change_pack(&pack_b).unwrap();
        assert_eq!(
            observer.marshal(),
            doc_a.marshal(),
            "observer diverged in round {round} (seed {:?})",
            fuzzer.seed,
        );
    }
}
