//! Anki package writer.
//!
//! An `.apkg` file is a zip archive holding a SQLite collection
//! (`collection.anki2`) plus a media manifest. The collection carries one
//! note model and one deck with fixed ids, so re-importing a regenerated
//! package updates the existing deck instead of duplicating it.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::json;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use cardmill_core::models::Flashcard;
use cardmill_core::{Error, Result};

/// Note model id shared by every generated package.
pub const MODEL_ID: i64 = 1_607_392_319;

/// Deck id shared by every generated package.
pub const DECK_ID: i64 = 2_059_400_110;

/// Unit separator, the Anki field delimiter.
const FIELD_SEP: char = '\u{1f}';

const SCHEMA: &str = "
CREATE TABLE col (
    id integer primary key,
    crt integer not null,
    mod integer not null,
    scm integer not null,
    ver integer not null,
    dty integer not null,
    usn integer not null,
    ls integer not null,
    conf text not null,
    models text not null,
    decks text not null,
    dconf text not null,
    tags text not null
);
CREATE TABLE notes (
    id integer primary key,
    guid text not null,
    mid integer not null,
    mod integer not null,
    usn integer not null,
    tags text not null,
    flds text not null,
    sfld integer not null,
    csum integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE cards (
    id integer primary key,
    nid integer not null,
    did integer not null,
    ord integer not null,
    mod integer not null,
    usn integer not null,
    type integer not null,
    queue integer not null,
    due integer not null,
    ivl integer not null,
    factor integer not null,
    reps integer not null,
    lapses integer not null,
    left integer not null,
    odue integer not null,
    odid integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE revlog (
    id integer primary key,
    cid integer not null,
    usn integer not null,
    ease integer not null,
    ivl integer not null,
    lastIvl integer not null,
    factor integer not null,
    time integer not null,
    type integer not null
);
CREATE TABLE graves (
    usn integer not null,
    oid integer not null,
    type integer not null
);
CREATE INDEX ix_notes_usn on notes (usn);
CREATE INDEX ix_cards_usn on cards (usn);
CREATE INDEX ix_revlog_usn on revlog (usn);
CREATE INDEX ix_cards_nid on cards (nid);
CREATE INDEX ix_cards_sched on cards (did, queue, due);
CREATE INDEX ix_revlog_cid on revlog (cid);
CREATE INDEX ix_notes_csum on notes (csum);
";

fn sqlite_err(e: rusqlite::Error) -> Error {
    Error::Storage(format!("anki collection: {e}"))
}

fn zip_err(e: zip::result::ZipError) -> Error {
    Error::Storage(format!("anki package: {e}"))
}

/// First 8 hex digits of the field hash, stored as an integer.
fn field_checksum(text: &str) -> i64 {
    let digest = hex::encode(Sha256::digest(text.as_bytes()));
    i64::from_str_radix(&digest[..8], 16).unwrap_or(0)
}

fn model_json(mod_secs: i64) -> serde_json::Value {
    let model = json!({
            "id": MODEL_ID,
            "name": "Simple Model",
            "did": DECK_ID,
            "css": ".card {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n color: black;\n background-color: white;\n}\n",
            "flds": [
                {"name": "Front", "ord": 0, "font": "Arial", "size": 20,
                 "media": [], "rtl": false, "sticky": false},
                {"name": "Back", "ord": 1, "font": "Arial", "size": 20,
                 "media": [], "rtl": false, "sticky": false}
            ],
            "tmpls": [
                {"name": "Card 1", "ord": 0, "qfmt": "{{Front}}",
                 "afmt": "{{FrontSide}}<hr id=\"answer\">{{Back}}",
                 "bqfmt": "", "bafmt": "", "did": null}
            ],
            "latexPre": "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n",
            "latexPost": "\\end{document}",
            "mod": mod_secs,
            "req": [[0, "all", [0]]],
            "sortf": 0,
            "tags": [],
            "type": 0,
            "usn": -1,
            "vers": []
    });
    let mut models = serde_json::Map::new();
    models.insert(MODEL_ID.to_string(), model);
    serde_json::Value::Object(models)
}

fn deck_entry(id: i64, name: &str, mod_secs: i64) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "desc": "",
        "collapsed": false,
        "conf": 1,
        "dyn": 0,
        "extendNew": 0,
        "extendRev": 50,
        "lrnToday": [0, 0],
        "newToday": [0, 0],
        "revToday": [0, 0],
        "timeToday": [0, 0],
        "mod": mod_secs,
        "usn": -1
    })
}

fn dconf_json() -> serde_json::Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "autoplay": true,
            "timer": 0,
            "replayq": true,
            "maxTaken": 60,
            "new": {"bury": true, "delays": [1, 10], "initialFactor": 2500,
                    "ints": [1, 4, 7], "order": 1, "perDay": 20, "separate": true},
            "rev": {"bury": true, "ease4": 1.3, "fuzz": 0.05, "ivlFct": 1,
                    "maxIvl": 36500, "minSpace": 1, "perDay": 100},
            "lapse": {"delays": [10], "leechAction": 0, "leechFails": 8,
                      "minInt": 1, "mult": 0}
        }
    })
}

fn conf_json() -> serde_json::Value {
    json!({
        "activeDecks": [1],
        "addToCur": true,
        "collapseTime": 1200,
        "curDeck": 1,
        "curModel": MODEL_ID.to_string(),
        "dueCounts": true,
        "estTimes": true,
        "newBury": true,
        "newSpread": 0,
        "nextPos": 1,
        "sortBackwards": false,
        "sortType": "noteFld",
        "timeLim": 0
    })
}

fn write_collection(path: &Path, deck_name: &str, cards: &[Flashcard]) -> Result<()> {
    let conn = Connection::open(path).map_err(sqlite_err)?;
    conn.execute_batch(SCHEMA).map_err(sqlite_err)?;

    let now = Utc::now();
    let now_secs = now.timestamp();
    let now_millis = now.timestamp_millis();

    let mut deck_map = serde_json::Map::new();
    deck_map.insert("1".to_string(), deck_entry(1, "Default", now_secs));
    deck_map.insert(
        DECK_ID.to_string(),
        deck_entry(DECK_ID, deck_name, now_secs),
    );
    let decks = serde_json::Value::Object(deck_map);

    conn.execute(
        "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls,
                          conf, models, decks, dconf, tags)
         VALUES (1, ?1, ?2, ?2, 11, 0, 0, 0, ?3, ?4, ?5, ?6, '{}')",
        params![
            now_secs,
            now_millis,
            conf_json().to_string(),
            model_json(now_secs).to_string(),
            decks.to_string(),
            dconf_json().to_string(),
        ],
    )
    .map_err(sqlite_err)?;

    for (idx, card) in cards.iter().enumerate() {
        let note_id = now_millis + idx as i64;
        let guid = uuid::Uuid::new_v4().simple().to_string();
        let fields = format!("{}{FIELD_SEP}{}", card.front, card.back);
        conn.execute(
            "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds,
                                sfld, csum, flags, data)
             VALUES (?1, ?2, ?3, ?4, -1, '', ?5, ?6, ?7, 0, '')",
            params![
                note_id,
                guid,
                MODEL_ID,
                now_secs,
                fields,
                card.front,
                field_checksum(&card.front),
            ],
        )
        .map_err(sqlite_err)?;
        conn.execute(
            "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue,
                                due, ivl, factor, reps, lapses, left,
                                odue, odid, flags, data)
             VALUES (?1, ?2, ?3, 0, ?4, -1, 0, 0, ?5, 0, 0, 0, 0, 0, 0, 0, 0, '')",
            params![note_id, note_id, DECK_ID, now_secs, idx as i64 + 1],
        )
        .map_err(sqlite_err)?;
    }

    Ok(())
}

/// Write a complete `.apkg` package to `path`.
pub fn write_package(path: &Path, deck_name: &str, cards: &[Flashcard]) -> Result<()> {
    let staging = tempfile::tempdir()?;
    let collection = staging.path().join("collection.anki2");
    write_collection(&collection, deck_name, cards)?;

    let mut bytes = Vec::new();
    File::open(&collection)?.read_to_end(&mut bytes)?;

    let mut zip = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default();
    zip.start_file("collection.anki2", options).map_err(zip_err)?;
    zip.write_all(&bytes)?;
    zip.start_file("media", options).map_err(zip_err)?;
    zip.write_all(b"{}")?;
    zip.finish().map_err(zip_err)?;
    Ok(())
}
