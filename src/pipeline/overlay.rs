//! The overlay engine: record + flags → ordered draw calls on one page.
//!
//! ## Two phases
//!
//! [`OverlayEngine::plan`] walks the placement table and decides, for every
//! entry, whether anything is drawn and what. It is pure: same record, same
//! context, same `now`, same page height → same plan. [`OverlayEngine::apply`]
//! then replays the plan against a [`PageCanvas`]. Keeping the decisions out
//! of the drawing backend is what makes them testable without pdfium.
//!
//! ## Per-key rules
//!
//! | key | drawn when | what |
//! |-----|-----------|------|
//! | `username` | name present (and `sign`, on gated templates) | text, 12 pt |
//! | `exception` | flag is `Some(_)` | tick image 10×10; `false` sits 14 pt higher |
//! | `signedBy` | `sign` and username present | "Digitally signed by …", 8 pt |
//! | `email` | email present (and `sign`, on gated templates) | text, 8 pt |
//! | `signedAt` | `sign` and username present | timestamp, 8 pt |
//! | anything else | record value present | formatted value, body size |

use crate::config::CertificateConfig;
use crate::error::{CertificateError, FormatError};
use crate::output::{DrawKind, DrawOp};
use crate::pipeline::format::FieldFormatter;
use crate::pipeline::placement::{FieldKey, Placement, TemplateProfile};
use crate::record::CertificateRecord;
use crate::request::RenderContext;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Font size of the username line.
pub const USERNAME_FONT_SIZE: f32 = 12.0;
/// Font size of the email / signed-by / signed-at lines.
pub const SIGNATURE_FONT_SIZE: f32 = 8.0;
/// Side of the square exception tick.
pub const INDICATOR_SIZE: f32 = 10.0;
/// Vertical distance between the "yes" and "no" exception boxes.
pub const EXCEPTION_NO_OFFSET: f32 = 14.0;

/// A page that can receive text and the indicator image.
///
/// Coordinates are PDF user space: origin at the bottom-left corner.
pub trait PageCanvas {
    fn page_height(&self) -> f32;

    fn draw_text(&mut self, text: &str, x: f32, y: f32, font_size: f32)
        -> Result<(), CertificateError>;

    fn draw_image(&mut self, x: f32, y: f32, width: f32, height: f32)
        -> Result<(), CertificateError>;
}

/// Turns records into draw plans for one template profile.
#[derive(Debug, Clone)]
pub struct OverlayEngine {
    profile: TemplateProfile,
    formatter: FieldFormatter,
}

impl OverlayEngine {
    pub fn new(profile: TemplateProfile, formatter: FieldFormatter) -> Self {
        Self { profile, formatter }
    }

    /// Engine for the profile, time zone, and signature suffix in `config`.
    pub fn from_config(config: &CertificateConfig) -> Self {
        let profile = config.profile();
        let formatter = FieldFormatter::new(
            config.time_zone.clone(),
            config.signature_suffix.clone(),
            profile.date_fields.clone(),
        );
        Self::new(profile, formatter)
    }

    pub fn profile(&self) -> &TemplateProfile {
        &self.profile
    }

    /// Decide every draw call for the page, in placement-table order.
    ///
    /// # Errors
    /// A [`FormatError`] for the first record field whose value cannot be
    /// formatted. The plan is all-or-nothing.
    pub fn plan(
        &self,
        record: &CertificateRecord,
        ctx: &RenderContext,
        page_height: f32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DrawOp>, FormatError> {
        let mut ops = Vec::with_capacity(self.profile.placements.len());
        for placement in self.profile.placements.entries() {
            if let Some(op) = self.plan_entry(placement, record, ctx, page_height, now)? {
                ops.push(op);
            }
        }
        Ok(ops)
    }

    fn plan_entry(
        &self,
        placement: &Placement,
        record: &CertificateRecord,
        ctx: &RenderContext,
        page_height: f32,
        now: DateTime<Utc>,
    ) -> Result<Option<DrawOp>, FormatError> {
        let Placement { key, x, y } = placement;
        let baseline = page_height - y;
        let self_fields_allowed = ctx.sign || !self.profile.self_fields_require_sign;
        let signer = ctx.username.as_deref().filter(|_| ctx.sign);

        let text = |text: String, font_size: f32| DrawOp {
            key: key.clone(),
            x: *x,
            y: baseline,
            kind: DrawKind::Text { text, font_size },
        };

        let op = match FieldKey::classify(key) {
            FieldKey::Username => ctx
                .username
                .clone()
                .filter(|_| self_fields_allowed)
                .map(|name| text(name, USERNAME_FONT_SIZE)),

            FieldKey::Exception => ctx.exception.map(|checked| DrawOp {
                key: key.clone(),
                x: *x,
                y: if checked {
                    baseline
                } else {
                    baseline + EXCEPTION_NO_OFFSET
                },
                kind: DrawKind::Image {
                    width: INDICATOR_SIZE,
                    height: INDICATOR_SIZE,
                },
            }),

            FieldKey::SignedBy => signer
                .and_then(|username| {
                    let name = ctx.full_name.as_deref().unwrap_or(username);
                    self.formatter.format_signed_by(name)
                })
                .map(|line| text(line, SIGNATURE_FONT_SIZE)),

            FieldKey::Email => ctx
                .email
                .clone()
                .filter(|_| self_fields_allowed)
                .map(|email| text(email, SIGNATURE_FONT_SIZE)),

            FieldKey::SignedAt => signer
                .map(|_| text(self.formatter.format_signed_at(now), SIGNATURE_FONT_SIZE)),

            FieldKey::Record(field) => self
                .formatter
                .format_field(field, record.get(field))?
                .map(|value| text(value, self.profile.body_font_size)),
        };

        Ok(op)
    }

    /// Replay a plan onto a page.
    pub fn apply<C: PageCanvas + ?Sized>(
        ops: &[DrawOp],
        canvas: &mut C,
    ) -> Result<(), CertificateError> {
        for op in ops {
            debug!("draw {} at ({}, {})", op.key, op.x, op.y);
            let drawn = match &op.kind {
                DrawKind::Text { text, font_size } => {
                    canvas.draw_text(text, op.x, op.y, *font_size)
                }
                DrawKind::Image { width, height } => {
                    canvas.draw_image(op.x, op.y, *width, *height)
                }
            };
            // Canvases don't know placement keys; attach the one being drawn.
            drawn.map_err(|e| match e {
                CertificateError::DrawFailed { detail, .. } => CertificateError::DrawFailed {
                    key: op.key.clone(),
                    detail,
                },
                other => other,
            })?;
        }
        Ok(())
    }

    /// Plan against the canvas's page height, then draw.
    pub fn overlay<C: PageCanvas + ?Sized>(
        &self,
        canvas: &mut C,
        record: &CertificateRecord,
        ctx: &RenderContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<DrawOp>, CertificateError> {
        let ops = self.plan(record, ctx, canvas.page_height(), now)?;
        Self::apply(&ops, canvas)?;
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeZonePolicy;
    use crate::pipeline::placement::TemplateVersion;
    use chrono::TimeZone;

    const H: f32 = 792.0;

    fn engine(version: TemplateVersion) -> OverlayEngine {
        let config = CertificateConfig::builder()
            .template_version(version)
            .time_zone(TimeZonePolicy::Utc)
            .build()
            .unwrap();
        OverlayEngine::from_config(&config)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 14, 9, 30, 0).unwrap()
    }

    fn ctx(sign: bool, exception: Option<bool>) -> RenderContext {
        RenderContext {
            username: Some("jdoe".into()),
            full_name: Some("Jane Doe [CONTRACTOR]".into()),
            email: Some("jdoe@example.com".into()),
            exception,
            sign,
        }
    }

    fn find<'a>(ops: &'a [DrawOp], key: &str) -> Option<&'a DrawOp> {
        ops.iter().find(|op| op.key == key)
    }

    #[derive(Default)]
    struct RecordingCanvas {
        calls: Vec<String>,
    }

    impl PageCanvas for RecordingCanvas {
        fn page_height(&self) -> f32 {
            H
        }

        fn draw_text(&mut self, text: &str, x: f32, y: f32, size: f32) -> Result<(), CertificateError> {
            self.calls.push(format!("text {text} {x} {y} {size}"));
            Ok(())
        }

        fn draw_image(&mut self, x: f32, y: f32, w: f32, h: f32) -> Result<(), CertificateError> {
            self.calls.push(format!("image {x} {y} {w}x{h}"));
            Ok(())
        }
    }

    #[test]
    fn exception_true_draws_at_anchor() {
        let ops = engine(TemplateVersion::Rev2)
            .plan(&CertificateRecord::new(), &ctx(false, Some(true)), H, now())
            .unwrap();
        let tick = find(&ops, "exception").unwrap();
        assert!(tick.is_image());
        assert_eq!((tick.x, tick.y), (419.0, H - 647.0));
    }

    #[test]
    fn exception_false_draws_in_no_box() {
        let ops = engine(TemplateVersion::Rev2)
            .plan(&CertificateRecord::new(), &ctx(false, Some(false)), H, now())
            .unwrap();
        let tick = find(&ops, "exception").unwrap();
        assert_eq!((tick.x, tick.y), (419.0, H - 647.0 + 14.0));
        assert_eq!(
            tick.kind,
            DrawKind::Image {
                width: 10.0,
                height: 10.0
            }
        );
    }

    #[test]
    fn exception_absent_draws_nothing() {
        let ops = engine(TemplateVersion::Rev2)
            .plan(&CertificateRecord::new(), &ctx(true, None), H, now())
            .unwrap();
        assert!(find(&ops, "exception").is_none());
    }

    #[test]
    fn unsigned_request_omits_signature_block() {
        let ops = engine(TemplateVersion::Rev2)
            .plan(&CertificateRecord::new(), &ctx(false, None), H, now())
            .unwrap();
        for key in ["username", "email", "signedBy", "signedAt"] {
            assert!(find(&ops, key).is_none(), "{key} drawn without sign");
        }
    }

    #[test]
    fn ungated_template_prints_self_fields_without_sign() {
        let ops = engine(TemplateVersion::Rev1)
            .plan(&CertificateRecord::new(), &ctx(false, None), H, now())
            .unwrap();
        assert_eq!(find(&ops, "username").and_then(DrawOp::text), Some("jdoe"));
        assert_eq!(
            find(&ops, "email").and_then(DrawOp::text),
            Some("jdoe@example.com")
        );
        assert!(find(&ops, "signedBy").is_none());
        assert!(find(&ops, "signedAt").is_none());
    }

    #[test]
    fn signed_request_prints_signature_block() {
        let ops = engine(TemplateVersion::Rev2)
            .plan(&CertificateRecord::new(), &ctx(true, None), H, now())
            .unwrap();

        let username = find(&ops, "username").unwrap();
        assert_eq!(
            username.kind,
            DrawKind::Text {
                text: "jdoe".into(),
                font_size: 12.0
            }
        );
        assert_eq!((username.x, username.y), (260.0, H - 680.0));

        assert_eq!(
            find(&ops, "signedBy").and_then(DrawOp::text),
            Some("Digitally signed by Jane Doe (WWID)")
        );
        assert_eq!(
            find(&ops, "signedAt").and_then(DrawOp::text),
            Some("14 Oct 2024 09:30:00 (UTC)")
        );
        assert_eq!(
            find(&ops, "email").and_then(DrawOp::text),
            Some("jdoe@example.com")
        );
    }

    #[test]
    fn signature_needs_username() {
        let mut context = ctx(true, None);
        context.username = None;
        let ops = engine(TemplateVersion::Rev2)
            .plan(&CertificateRecord::new(), &context, H, now())
            .unwrap();
        assert!(find(&ops, "signedBy").is_none());
        assert!(find(&ops, "signedAt").is_none());
        assert!(find(&ops, "email").is_some());
    }

    #[test]
    fn absent_record_fields_draw_nothing() {
        let mut record: CertificateRecord = [("patientName", "Sanjay")].into_iter().collect();
        record.insert("country", None);
        record.insert("pccNumber", Some(String::new()));

        let ops = engine(TemplateVersion::Rev2)
            .plan(&record, &RenderContext::default(), H, now())
            .unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].key, "patientName");
    }

    #[test]
    fn record_fields_use_body_font_and_dates() {
        let record: CertificateRecord = [
            ("expirationDate", "2024-10-14T06:13:05.105Z"),
            ("productDose", "10mg"),
        ]
        .into_iter()
        .collect();
        let ops = engine(TemplateVersion::Rev2)
            .plan(&record, &RenderContext::default(), H, now())
            .unwrap();

        assert_eq!(
            find(&ops, "expirationDate").unwrap().kind,
            DrawKind::Text {
                text: "14/10/2024".into(),
                font_size: 8.0
            }
        );
        let dose = find(&ops, "productDose").unwrap();
        assert_eq!((dose.x, dose.y), (450.0, H - 315.0));
    }

    #[test]
    fn bad_date_aborts_plan() {
        let record: CertificateRecord = [("patientDOB", "Invalid Date")].into_iter().collect();
        let err = engine(TemplateVersion::Rev2)
            .plan(&record, &RenderContext::default(), H, now())
            .unwrap_err();
        assert_eq!(err.key, "patientDOB");
        assert_eq!(err.raw, "Invalid Date");
    }

    #[test]
    fn plan_is_deterministic_and_ordered() {
        let record: CertificateRecord = [
            ("country", "IN"),
            ("patientName", "Sanjay"),
            ("batchNumber", "B114AF"),
        ]
        .into_iter()
        .collect();
        let e = engine(TemplateVersion::Rev2);
        let first = e.plan(&record, &ctx(true, Some(true)), H, now()).unwrap();
        let second = e.plan(&record, &ctx(true, Some(true)), H, now()).unwrap();
        assert_eq!(first, second);

        let keys: Vec<&str> = first.iter().map(|op| op.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "patientName",
                "batchNumber",
                "country",
                "exception",
                "username",
                "email",
                "signedAt",
                "signedBy"
            ]
        );
    }

    #[test]
    fn overlay_replays_plan_on_canvas() {
        let record: CertificateRecord = [("country", "IN")].into_iter().collect();
        let mut canvas = RecordingCanvas::default();
        let ops = engine(TemplateVersion::Rev2)
            .overlay(&mut canvas, &record, &ctx(false, Some(false)), now())
            .unwrap();

        assert_eq!(ops.len(), 2);
        assert_eq!(
            canvas.calls,
            vec![
                format!("text IN 210 {} 8", H - 452.0),
                format!("image 419 {} 10x10", H - 647.0 + 14.0),
            ]
        );
    }

    #[test]
    fn canvas_errors_propagate() {
        struct Broken;
        impl PageCanvas for Broken {
            fn page_height(&self) -> f32 {
                H
            }
            fn draw_text(&mut self, _: &str, _: f32, _: f32, _: f32) -> Result<(), CertificateError> {
                Err(CertificateError::DrawFailed {
                    key: "country".into(),
                    detail: "font missing".into(),
                })
            }
            fn draw_image(&mut self, _: f32, _: f32, _: f32, _: f32) -> Result<(), CertificateError> {
                Ok(())
            }
        }

        let record: CertificateRecord = [("country", "IN")].into_iter().collect();
        let err = engine(TemplateVersion::Rev2)
            .overlay(&mut Broken, &record, &RenderContext::default(), now())
            .unwrap_err();
        assert!(matches!(err, CertificateError::DrawFailed { .. }));
    }
}
