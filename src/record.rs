//! Attaching stored images to records, and keeping storage in step.
//!
//! A listing keeps a list of image references in `listings.images`; a
//! profile keeps one in `profiles.avatar_url`. Each reference is an
//! [`ImageRef`], stored as either a bare URL or a variant-set object.
//!
//! Replacing images is a two-phase swap: the record is written first, and
//! only then are the previous generation's objects removed. A crash between
//! the two leaves orphans, never a record pointing at deleted blobs. Orphans
//! from crashes, lost races, or abandoned uploads are reclaimed by
//! [`sweep_orphans`], which should run while no upload is in flight.

use crate::storage::{ObjectStore, Record, RecordStore, StorageError};
use crate::variant::{ImageRef, VariantSet, VariantSetError};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid image reference: {0}")]
    InvalidRef(#[from] VariantSetError),
    #[error("Field {field} holds a single image, got {count}")]
    SingleField { field: String, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// One reference or null.
    Single,
    /// An array of references.
    List,
}

/// The record field images are attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageField {
    pub table: String,
    pub id: String,
    pub field: String,
    pub kind: FieldKind,
}

impl ImageField {
    pub fn new(table: &str, id: &str, field: &str, kind: FieldKind) -> Self {
        Self {
            table: table.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            kind,
        }
    }

    /// `listings.images` of one listing.
    pub fn listing(id: &str) -> Self {
        Self::new("listings", id, "images", FieldKind::List)
    }

    /// `profiles.avatar_url` of one profile.
    pub fn avatar(id: &str) -> Self {
        Self::new("profiles", id, "avatar_url", FieldKind::Single)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachMode {
    #[default]
    Replace,
    /// Add after existing references. Only valid for list fields.
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachOutcome {
    pub record: Record,
    /// Object paths of the previous generation that were removed.
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Objects listed under the prefix.
    pub scanned: usize,
    /// Listed objects some record still references.
    pub referenced: usize,
    /// Orphans removed, or that would be removed on a dry run.
    pub removed: Vec<String>,
}

/// Read whatever a record field holds as image references.
///
/// Null and empty strings read as nothing; a string is a legacy URL; an
/// object is a variant set; an array is read element by element. Values of
/// any other shape are ignored.
pub fn read_refs(value: &Value) -> Vec<ImageRef> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(s) => vec![ImageRef::Legacy(s.clone())],
        Value::Object(_) => match serde_json::from_value::<VariantSet>(value.clone()) {
            Ok(set) if !set.is_empty() => vec![ImageRef::Variants(set)],
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!("ignoring malformed variant object: {e}");
                Vec::new()
            }
        },
        Value::Array(items) => items.iter().flat_map(read_refs).collect(),
        _ => Vec::new(),
    }
}

/// References currently stored in a field. A missing record reads as empty.
pub fn current_refs(
    records: &impl RecordStore,
    field: &ImageField,
) -> Result<Vec<ImageRef>, RecordError> {
    let record = records.fetch(&field.table, &field.id)?;
    Ok(record
        .as_ref()
        .and_then(|r| r.get(&field.field))
        .map(read_refs)
        .unwrap_or_default())
}

fn field_value(field: &ImageField, refs: &[ImageRef]) -> Result<Value, RecordError> {
    match field.kind {
        FieldKind::Single => match refs {
            [] => Ok(Value::Null),
            [one] => Ok(serde_json::to_value(one)?),
            many => Err(RecordError::SingleField {
                field: field.field.clone(),
                count: many.len(),
            }),
        },
        FieldKind::List => Ok(serde_json::to_value(refs)?),
    }
}

fn write_field(
    records: &impl RecordStore,
    field: &ImageField,
    value: Value,
) -> Result<Record, RecordError> {
    let mut fields = Record::new();
    fields.insert(field.field.clone(), value);
    Ok(records.update(&field.table, &field.id, fields)?)
}

/// Stored object paths behind a set of references. URLs served from
/// elsewhere are skipped.
///
/// A legacy URL with a variant suffix also covers its sibling renditions,
/// since readers reach them by rewriting the suffix.
pub fn object_paths(objects: &impl ObjectStore, bucket: &str, refs: &[ImageRef]) -> Vec<String> {
    let mut paths = BTreeSet::new();
    for r in refs {
        let expanded = match r {
            ImageRef::Legacy(url) => VariantSet::from_variant_url(url).map(ImageRef::Variants),
            ImageRef::Variants(_) => None,
        };
        for url in expanded.as_ref().unwrap_or(r).urls() {
            if let Some(path) = objects.path_from_url(bucket, url) {
                paths.insert(path);
            }
        }
    }
    paths.into_iter().collect()
}

/// Remove objects, logging instead of failing.
fn remove_quietly(objects: &impl ObjectStore, bucket: &str, paths: &[String]) -> Vec<String> {
    if paths.is_empty() {
        return Vec::new();
    }
    match objects.remove(bucket, paths) {
        Ok(()) => paths.to_vec(),
        Err(e) => {
            warn!("could not remove {} objects: {e}", paths.len());
            Vec::new()
        }
    }
}

/// Write new references to a record field.
///
/// With [`AttachMode::Replace`] the previous references' objects are removed
/// after the record write succeeds, except those the new value still uses.
pub fn attach_images(
    records: &impl RecordStore,
    objects: &impl ObjectStore,
    bucket: &str,
    field: &ImageField,
    refs: Vec<ImageRef>,
    mode: AttachMode,
) -> Result<AttachOutcome, RecordError> {
    for r in &refs {
        r.validate()?;
    }

    let previous = current_refs(records, field)?;
    let next = match mode {
        AttachMode::Replace => refs,
        AttachMode::Append => previous.iter().cloned().chain(refs).collect(),
    };

    let record = write_field(records, field, field_value(field, &next)?)?;

    let removed = match mode {
        AttachMode::Replace => {
            let keep: BTreeSet<String> = object_paths(objects, bucket, &next).into_iter().collect();
            let stale: Vec<String> = object_paths(objects, bucket, &previous)
                .into_iter()
                .filter(|p| !keep.contains(p))
                .collect();
            remove_quietly(objects, bucket, &stale)
        }
        AttachMode::Append => Vec::new(),
    };

    debug!(
        table = %field.table,
        id = %field.id,
        removed = removed.len(),
        "attached {} image references",
        next.len()
    );
    Ok(AttachOutcome { record, removed })
}

/// Clear a field and remove the objects it referenced.
pub fn remove_images(
    records: &impl RecordStore,
    objects: &impl ObjectStore,
    bucket: &str,
    field: &ImageField,
) -> Result<Vec<String>, RecordError> {
    let previous = current_refs(records, field)?;
    write_field(records, field, field_value(field, &[])?)?;
    let paths = object_paths(objects, bucket, &previous);
    Ok(remove_quietly(objects, bucket, &paths))
}

/// Remove the objects referenced by `image_fields` of a record, then the
/// record itself.
pub fn delete_record(
    records: &impl RecordStore,
    objects: &impl ObjectStore,
    bucket: &str,
    table: &str,
    id: &str,
    image_fields: &[&str],
) -> Result<Vec<String>, RecordError> {
    let Some(record) = records.fetch(table, id)? else {
        return Ok(Vec::new());
    };
    let refs: Vec<ImageRef> = image_fields
        .iter()
        .filter_map(|f| record.get(*f))
        .flat_map(read_refs)
        .collect();
    let paths = object_paths(objects, bucket, &refs);
    let removed = remove_quietly(objects, bucket, &paths);
    records.delete(table, id)?;
    Ok(removed)
}

/// Remove stored objects under `prefix` that no record references.
///
/// `fields` lists the `(table, field)` columns that hold image references.
/// With `dry_run` nothing is removed; the report lists what would be.
pub fn sweep_orphans(
    records: &impl RecordStore,
    objects: &impl ObjectStore,
    bucket: &str,
    prefix: &str,
    fields: &[(&str, &str)],
    dry_run: bool,
) -> Result<SweepReport, RecordError> {
    let mut referenced = BTreeSet::new();
    for (table, field) in fields {
        for record in records.list(table)? {
            if let Some(value) = record.get(*field) {
                referenced.extend(object_paths(objects, bucket, &read_refs(value)));
            }
        }
    }

    let listed = objects.list(bucket, prefix)?;
    let (kept, orphans): (Vec<String>, Vec<String>) =
        listed.iter().cloned().partition(|p| referenced.contains(p));

    if !dry_run && !orphans.is_empty() {
        objects.remove(bucket, &orphans)?;
    }

    Ok(SweepReport {
        scanned: listed.len(),
        referenced: kept.len(),
        removed: orphans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryObjectStore, MemoryRecordStore};
    use crate::test_helpers::full_set;
    use serde_json::json;

    const BUCKET: &str = "listings";

    /// Store the four variants of `base` and return their set.
    fn stored_set(objects: &MemoryObjectStore, base: &str) -> VariantSet {
        for label in ["thumbnail", "medium", "large", "original"] {
            objects
                .put(BUCKET, &format!("{base}-{label}.webp"), b"x", "image/webp")
                .unwrap();
        }
        full_set(&objects.public_url(BUCKET, base))
    }

    #[test]
    fn read_refs_tolerates_every_shape() {
        assert!(read_refs(&Value::Null).is_empty());
        assert!(read_refs(&json!("")).is_empty());
        assert_eq!(
            read_refs(&json!("https://cdn/a.jpg")),
            vec![ImageRef::Legacy("https://cdn/a.jpg".into())]
        );
        let refs = read_refs(&json!(["https://cdn/a.jpg", {"medium": "m"}, null, 42]));
        assert_eq!(refs.len(), 2);
        assert!(matches!(refs[1], ImageRef::Variants(_)));
        assert!(read_refs(&json!({})).is_empty());
        assert!(read_refs(&json!({"medium": 3})).is_empty());
    }

    #[test]
    fn attach_to_new_listing() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let set = stored_set(&objects, "a");

        let outcome = attach_images(
            &records,
            &objects,
            BUCKET,
            &ImageField::listing("7"),
            vec![set.clone().into()],
            AttachMode::Replace,
        )
        .unwrap();
        assert!(outcome.removed.is_empty());
        assert_eq!(
            current_refs(&records, &ImageField::listing("7")).unwrap(),
            vec![ImageRef::Variants(set)]
        );
    }

    #[test]
    fn replace_removes_previous_generation_after_write() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let field = ImageField::avatar("u1");
        let old = stored_set(&objects, "old");
        let new = stored_set(&objects, "new");

        attach_images(&records, &objects, BUCKET, &field, vec![old.into()], AttachMode::Replace)
            .unwrap();
        let outcome = attach_images(
            &records,
            &objects,
            BUCKET,
            &field,
            vec![new.clone().into()],
            AttachMode::Replace,
        )
        .unwrap();

        assert_eq!(outcome.removed.len(), 4);
        assert!(outcome.removed.iter().all(|p| p.starts_with("old-")));
        assert_eq!(objects.list(BUCKET, "old-").unwrap(), Vec::<String>::new());
        assert_eq!(objects.list(BUCKET, "new-").unwrap().len(), 4);
        assert_eq!(
            outcome.record["avatar_url"],
            serde_json::to_value(ImageRef::Variants(new)).unwrap()
        );
    }

    #[test]
    fn failed_record_write_keeps_previous_objects() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let field = ImageField::avatar("u1");
        let old = stored_set(&objects, "old");
        let new = stored_set(&objects, "new");
        attach_images(&records, &objects, BUCKET, &field, vec![old.into()], AttachMode::Replace)
            .unwrap();

        records.set_fail_updates(true);
        let result =
            attach_images(&records, &objects, BUCKET, &field, vec![new.into()], AttachMode::Replace);
        assert!(matches!(result, Err(RecordError::Storage(_))));
        assert_eq!(objects.list(BUCKET, "old-").unwrap().len(), 4);
    }

    #[test]
    fn append_keeps_existing_images() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let field = ImageField::listing("9");
        let first = stored_set(&objects, "first");
        let second = stored_set(&objects, "second");

        attach_images(&records, &objects, BUCKET, &field, vec![first.into()], AttachMode::Append)
            .unwrap();
        let outcome =
            attach_images(&records, &objects, BUCKET, &field, vec![second.into()], AttachMode::Append)
                .unwrap();
        assert!(outcome.removed.is_empty());
        assert_eq!(current_refs(&records, &field).unwrap().len(), 2);
        assert_eq!(objects.list(BUCKET, "").unwrap().len(), 8);
    }

    #[test]
    fn invalid_ref_is_rejected_before_any_write() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let field = ImageField::listing("1");
        let result = attach_images(
            &records,
            &objects,
            BUCKET,
            &field,
            vec![VariantSet::default().into()],
            AttachMode::Replace,
        );
        assert!(matches!(
            result,
            Err(RecordError::InvalidRef(VariantSetError::Empty))
        ));
        assert!(records.fetch("listings", "1").unwrap().is_none());
    }

    #[test]
    fn single_field_takes_one_ref() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let result = attach_images(
            &records,
            &objects,
            BUCKET,
            &ImageField::avatar("u1"),
            vec![
                ImageRef::Legacy("https://cdn/a.jpg".into()),
                ImageRef::Legacy("https://cdn/b.jpg".into()),
            ],
            AttachMode::Replace,
        );
        assert!(matches!(
            result,
            Err(RecordError::SingleField { count: 2, .. })
        ));
    }

    #[test]
    fn legacy_urls_from_elsewhere_are_left_alone() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let field = ImageField::avatar("u1");
        attach_images(
            &records,
            &objects,
            BUCKET,
            &field,
            vec![ImageRef::Legacy("https://elsewhere/me.jpg".into())],
            AttachMode::Replace,
        )
        .unwrap();
        let removed = remove_images(&records, &objects, BUCKET, &field).unwrap();
        assert!(removed.is_empty());
        let record = records.fetch("profiles", "u1").unwrap().unwrap();
        assert_eq!(record["avatar_url"], Value::Null);
    }

    #[test]
    fn remove_images_clears_list_and_objects() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let field = ImageField::listing("3");
        let set = stored_set(&objects, "a");
        attach_images(&records, &objects, BUCKET, &field, vec![set.into()], AttachMode::Replace)
            .unwrap();

        let removed = remove_images(&records, &objects, BUCKET, &field).unwrap();
        assert_eq!(removed.len(), 4);
        assert!(objects.list(BUCKET, "").unwrap().is_empty());
        let record = records.fetch("listings", "3").unwrap().unwrap();
        assert_eq!(record["images"], json!([]));
    }

    #[test]
    fn delete_record_removes_objects_then_record() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let field = ImageField::listing("5");
        let set = stored_set(&objects, "a");
        attach_images(&records, &objects, BUCKET, &field, vec![set.into()], AttachMode::Replace)
            .unwrap();

        let removed =
            delete_record(&records, &objects, BUCKET, "listings", "5", &["images"]).unwrap();
        assert_eq!(removed.len(), 4);
        assert!(records.fetch("listings", "5").unwrap().is_none());
        assert!(
            delete_record(&records, &objects, BUCKET, "listings", "5", &["images"])
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn sweep_removes_only_unreferenced_objects() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        let kept = stored_set(&objects, "kept");
        stored_set(&objects, "lost");
        attach_images(
            &records,
            &objects,
            BUCKET,
            &ImageField::listing("1"),
            vec![kept.into()],
            AttachMode::Replace,
        )
        .unwrap();

        let report = sweep_orphans(
            &records,
            &objects,
            BUCKET,
            "",
            &[("listings", "images"), ("profiles", "avatar_url")],
            false,
        )
        .unwrap();
        assert_eq!(report.scanned, 8);
        assert_eq!(report.referenced, 4);
        assert_eq!(report.removed.len(), 4);
        assert!(report.removed.iter().all(|p| p.starts_with("lost-")));
        assert_eq!(objects.list(BUCKET, "").unwrap().len(), 4);
    }

    #[test]
    fn sweep_dry_run_removes_nothing() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        stored_set(&objects, "lost");
        let report =
            sweep_orphans(&records, &objects, BUCKET, "", &[("listings", "images")], true).unwrap();
        assert_eq!(report.removed.len(), 4);
        assert_eq!(objects.list(BUCKET, "").unwrap().len(), 4);
    }

    #[test]
    fn sweep_respects_backfilled_aliases() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        objects
            .put(BUCKET, "b-large.webp", b"x", "image/webp")
            .unwrap();
        let mut set = VariantSet::default();
        set.large = Some(objects.public_url(BUCKET, "b-large.webp"));
        set.backfill();
        attach_images(
            &records,
            &objects,
            BUCKET,
            &ImageField::listing("1"),
            vec![set.into()],
            AttachMode::Replace,
        )
        .unwrap();

        let report =
            sweep_orphans(&records, &objects, BUCKET, "", &[("listings", "images")], false)
                .unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.referenced, 1);
    }

    #[test]
    fn sweep_keeps_siblings_of_suffixed_legacy_url() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        stored_set(&objects, "b");
        stored_set(&objects, "lost");
        let legacy = ImageRef::Legacy(objects.public_url(BUCKET, "b-medium.webp"));
        attach_images(
            &records,
            &objects,
            BUCKET,
            &ImageField::listing("1"),
            vec![legacy],
            AttachMode::Replace,
        )
        .unwrap();

        let report =
            sweep_orphans(&records, &objects, BUCKET, "", &[("listings", "images")], false)
                .unwrap();
        assert_eq!(report.referenced, 4);
        assert!(report.removed.iter().all(|p| p.starts_with("lost-")));
        for label in ["thumbnail", "medium", "large", "original"] {
            assert!(objects.get(BUCKET, &format!("b-{label}.webp")).is_some());
        }
    }

    #[test]
    fn remove_images_cleans_siblings_of_suffixed_legacy_url() {
        let records = MemoryRecordStore::new();
        let objects = MemoryObjectStore::new();
        stored_set(&objects, "b");
        let field = ImageField::avatar("u");
        attach_images(
            &records,
            &objects,
            BUCKET,
            &field,
            vec![ImageRef::Legacy(objects.public_url(BUCKET, "b-large.webp"))],
            AttachMode::Replace,
        )
        .unwrap();

        let removed = remove_images(&records, &objects, BUCKET, &field).unwrap();
        assert_eq!(removed.len(), 4);
        assert!(objects.list(BUCKET, "b-").unwrap().is_empty());
    }
}
