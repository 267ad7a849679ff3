//! End-to-end pipeline tests with the real `image` backend and the
//! directory-backed stores.

use faso_media::config::MediaConfig;
use faso_media::display::{DisplayContext, ImageLoader, NetworkClass, resolve};
use faso_media::generate::GenerateError;
use faso_media::imaging::{OutputFormat, RustBackend};
use faso_media::record::{self, AttachMode, ImageField};
use faso_media::storage::{JsonRecordStore, LocalObjectStore, ObjectStore, RecordStore};
use faso_media::upload::{
    CancelToken, UploadError, UploadFile, UploadOptions, UploadReport, upload_images,
};
use faso_media::variant::{ImageRef, VariantLabel};
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

const BASE_URL: &str = "https://cdn.test/storage/v1/object/public";

fn photo_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn file(name: &str, content_type: &str, bytes: Vec<u8>) -> UploadFile {
    UploadFile {
        name: name.to_string(),
        content_type: content_type.to_string(),
        bytes,
    }
}

struct Stores {
    _tmp: TempDir,
    objects: LocalObjectStore,
    records: JsonRecordStore,
}

fn stores() -> Stores {
    let tmp = TempDir::new().unwrap();
    let objects = LocalObjectStore::new(tmp.path().join("objects"), BASE_URL);
    let records = JsonRecordStore::new(tmp.path().join("records"));
    Stores {
        _tmp: tmp,
        objects,
        records,
    }
}

fn upload(stores: &Stores, files: &[UploadFile], options: &UploadOptions) -> UploadReport {
    upload_images(
        &RustBackend::new(),
        &stores.objects,
        files,
        options,
        None,
        &CancelToken::new(),
    )
}

fn stored_dimensions(stores: &Stores, bucket: &str, url: &str) -> (u32, u32) {
    let path = stores.objects.path_from_url(bucket, url).unwrap();
    let full = stores.objects.root().join(bucket).join(&path);
    image::image_dimensions(&full).unwrap()
}

#[test]
fn upload_generates_fitted_webp_variants() {
    let stores = stores();
    let options = UploadOptions::default();
    let report = upload(
        &stores,
        &[file(
            "stall.jpg",
            "image/jpeg",
            photo_bytes(900, 600, ImageFormat::Jpeg),
        )],
        &options,
    );

    assert_eq!(report.uploaded.len(), 1);
    let set = &report.uploaded[0].variants;
    assert_eq!(set.urls().len(), 4);

    let dims = |label| stored_dimensions(&stores, &options.bucket, set.get(label).unwrap());
    assert_eq!(dims(VariantLabel::Thumbnail), (200, 133));
    assert_eq!(dims(VariantLabel::Medium), (800, 533));
    assert_eq!(dims(VariantLabel::Large), (900, 600));
    assert_eq!(dims(VariantLabel::Original), (900, 600));

    let base = &report.uploaded[0].base_name;
    for (label, url) in set.populated() {
        assert!(url.starts_with(BASE_URL));
        assert!(url.ends_with(&format!("/{base}-{label}.webp")));
    }

    let medium_path = Path::new(set.get(VariantLabel::Medium).unwrap());
    assert_eq!(medium_path.extension().unwrap(), "webp");
    let on_disk = stores.objects.list(&options.bucket, "").unwrap();
    assert_eq!(on_disk.len(), 4);
}

#[test]
fn mixed_batch_keeps_valid_files() {
    let stores = stores();
    let files = vec![
        file("a.png", "image/png", photo_bytes(300, 200, ImageFormat::Png)),
        file("notes.txt", "text/plain", b"not an image".to_vec()),
        file("broken.jpg", "image/jpeg", b"\xFF\xD8 truncated".to_vec()),
        file("b.jpg", "image/jpeg", photo_bytes(120, 160, ImageFormat::Jpeg)),
    ];
    let report = upload(&stores, &files, &UploadOptions::default());

    let names: Vec<&str> = report.uploaded.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["a.png", "b.jpg"]);
    assert_eq!(report.skipped_count(), 2);
    assert!(matches!(
        report.skipped[0].reason,
        UploadError::UnsupportedType { .. }
    ));
    assert!(matches!(
        report.skipped[1].reason,
        UploadError::Generate(GenerateError::Decode(_))
    ));
}

#[test]
fn jpeg_output_when_configured() {
    let stores = stores();
    let mut config = MediaConfig::default();
    config.variants.format = OutputFormat::Jpeg;
    config.variants.keep_original = false;
    let options = UploadOptions::from_config(&config);

    let report = upload(
        &stores,
        &[file(
            "stall.jpg",
            "image/jpeg",
            photo_bytes(400, 300, ImageFormat::Jpeg),
        )],
        &options,
    );
    let set = &report.uploaded[0].variants;
    assert_eq!(set.get(VariantLabel::Original), None);
    for (_, url) in set.populated() {
        assert!(url.ends_with(".jpg"));
        let path = stores.objects.path_from_url(&options.bucket, url).unwrap();
        let bytes = std::fs::read(stores.objects.root().join(&options.bucket).join(path)).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }
}

#[test]
fn attach_resolve_and_degrade() {
    let stores = stores();
    let options = UploadOptions::default();
    let report = upload(
        &stores,
        &[file(
            "stall.jpg",
            "image/jpeg",
            photo_bytes(640, 480, ImageFormat::Jpeg),
        )],
        &options,
    );

    let field = ImageField::listing("listing-1");
    record::attach_images(
        &stores.records,
        &stores.objects,
        &options.bucket,
        &field,
        report.image_refs(),
        AttachMode::Append,
    )
    .unwrap();

    let stored = stores.records.fetch("listings", "listing-1").unwrap().unwrap();
    let refs = record::read_refs(&stored["images"]);
    assert_eq!(refs.len(), 1);

    let resolved = resolve(
        refs.first(),
        DisplayContext::Card,
        NetworkClass::Normal,
        "/placeholder.svg",
    );
    assert!(resolved.url.ends_with("-medium.webp"));

    let mut loader = ImageLoader::new(
        refs.first().cloned(),
        DisplayContext::Detail,
        NetworkClass::Normal,
        "/placeholder.svg",
        3,
    );
    assert!(loader.url().ends_with("-large.webp"));
    assert!(loader.on_error().ends_with("-medium.webp"));
}

#[test]
fn avatar_replacement_removes_previous_files_and_sweep_clears_strays() {
    let stores = stores();
    let mut config = MediaConfig::default();
    config.upload.bucket = "avatars".into();
    let options = UploadOptions::from_config(&config);
    let photo = || {
        file(
            "me.jpg",
            "image/jpeg",
            photo_bytes(256, 256, ImageFormat::Jpeg),
        )
    };

    let first = upload(&stores, &[photo()], &options);
    let second = upload(&stores, &[photo()], &options);
    let stray = upload(&stores, &[photo()], &options);
    assert_ne!(first.uploaded[0].base_name, second.uploaded[0].base_name);

    let field = ImageField::avatar("user-1");
    for report in [&first, &second] {
        record::attach_images(
            &stores.records,
            &stores.objects,
            "avatars",
            &field,
            report.image_refs(),
            AttachMode::Replace,
        )
        .unwrap();
    }

    let first_base = &first.uploaded[0].base_name;
    assert!(stores.objects.list("avatars", first_base).unwrap().is_empty());
    assert_eq!(stores.objects.list("avatars", "").unwrap().len(), 8);

    let report = record::sweep_orphans(
        &stores.records,
        &stores.objects,
        "avatars",
        "",
        &[("profiles", "avatar_url")],
        false,
    )
    .unwrap();
    assert_eq!(report.referenced, 4);
    let stray_base = &stray.uploaded[0].base_name;
    assert!(report.removed.iter().all(|p| p.starts_with(stray_base.as_str())));
    assert_eq!(report.removed.len(), 4);

    let stored = stores.records.fetch("profiles", "user-1").unwrap().unwrap();
    let current: ImageRef = serde_json::from_value(stored["avatar_url"].clone()).unwrap();
    assert_eq!(current, second.uploaded[0].image_ref());
}
