// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OOXML part templates for the slide deck package. Static parts are plain
// constants; per-slide parts are rendered from small typed inputs with every
// piece of user text escaped.

use quick_xml::escape::escape;

/// EMU per PDF point.
pub const EMU_PER_POINT: i64 = 12_700;
/// Display typeface of every text run.
pub const DISPLAY_TYPEFACE: &str = "Microsoft JhengHei";
/// Portrait US Letter, the usual notes page.
const NOTES_SIZE: (i64, i64) = (6_858_000, 9_144_000);

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const CT_PML: &str = "application/vnd.openxmlformats-officedocument.presentationml";

const EMPTY_GROUP: &str = r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#;
const CLR_MAP: &str = r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#;

/// A rectangle in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmuRect {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
}

impl EmuRect {
    pub fn from_points(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x: to_emu(x),
            y: to_emu(y),
            cx: to_emu(width),
            cy: to_emu(height),
        }
    }
}

/// Points to EMU, truncating like an integer cast.
pub fn to_emu(points: f32) -> i64 {
    (points as f64 * EMU_PER_POINT as f64) as i64
}

/// Run fill: a solid colour, or none for transparent overlay text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFill<'a> {
    /// Lower-case `rrggbb` without the leading `#`.
    Solid(&'a str),
    None,
}

/// One single-run text box.
#[derive(Debug, Clone, Copy)]
pub struct TextBox<'a> {
    pub rect: EmuRect,
    pub text: &'a str,
    /// Hundredths of a point.
    pub size: u32,
    pub fill: RunFill<'a>,
}

/// Escaped text with XML-illegal control characters removed.
fn xml_text(raw: &str) -> String {
    let clean: String = raw
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect();
    escape(clean.as_str()).into_owned()
}

fn xfrm(rect: EmuRect) -> String {
    format!(
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        rect.x, rect.y, rect.cx, rect.cy
    )
}

// -- Per-slide parts ----------------------------------------------------------

/// A slide: full-bleed background picture (`rId2`) under the text boxes.
pub fn slide_xml(slide_size: EmuRect, boxes: &[TextBox<'_>]) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<p:sld {NS}><p:cSld><p:spTree>{EMPTY_GROUP}<p:pic><p:nvPicPr><p:cNvPr id="2" name="Background"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
        xfrm(slide_size)
    );

    for (index, text_box) in boxes.iter().enumerate() {
        let id = index + 3;
        let fill = match text_box.fill {
            RunFill::Solid(hex) => format!(r#"<a:solidFill><a:srgbClr val="{hex}"/></a:solidFill>"#),
            RunFill::None => "<a:noFill/>".to_string(),
        };
        xml.push_str(&format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap="square" rtlCol="0"><a:spAutoFit/></a:bodyPr><a:lstStyle/><a:p><a:r><a:rPr lang="zh-TW" sz="{}" dirty="0">{fill}<a:latin typeface="{DISPLAY_TYPEFACE}"/><a:ea typeface="{DISPLAY_TYPEFACE}"/></a:rPr><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>"#,
            index + 1,
            xfrm(text_box.rect),
            text_box.size,
            xml_text(text_box.text),
        ));
    }

    xml.push_str(r#"</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#);
    xml
}

/// Relationships of slide `n`: layout, background image, optional notes.
pub fn slide_rels_xml(n: usize, has_notes: bool) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="{REL}/image" Target="../media/image{n}.jpeg"/>"#
    );
    if has_notes {
        xml.push_str(&format!(
            r#"<Relationship Id="rId3" Type="{REL}/notesSlide" Target="../notesSlides/notesSlide{n}.xml"/>"#
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

/// Notes page with one paragraph per line of `notes`.
pub fn notes_slide_xml(notes: &str) -> String {
    let mut paragraphs = String::new();
    for line in notes.split('\n') {
        if line.is_empty() {
            paragraphs.push_str("<a:p><a:endParaRPr lang=\"zh-TW\"/></a:p>");
        } else {
            paragraphs.push_str(&format!(
                r#"<a:p><a:r><a:rPr lang="zh-TW" dirty="0"/><a:t>{}</a:t></a:r></a:p>"#,
                xml_text(line)
            ));
        }
    }
    format!(
        r#"{XML_DECL}<p:notes {NS}><p:cSld><p:spTree>{EMPTY_GROUP}<p:sp><p:nvSpPr><p:cNvPr id="2" name="Slide Image Placeholder 1"/><p:cNvSpPr><a:spLocks noGrp="1" noRot="1" noChangeAspect="1"/></p:cNvSpPr><p:nvPr><p:ph type="sldImg"/></p:nvPr></p:nvSpPr><p:spPr/></p:sp><p:sp><p:nvSpPr><p:cNvPr id="3" name="Notes Placeholder 2"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="body" idx="1"/></p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>{paragraphs}</p:txBody></p:sp></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:notes>"#
    )
}

pub fn notes_slide_rels_xml(n: usize) -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL}/notesMaster" Target="../notesMasters/notesMaster1.xml"/><Relationship Id="rId2" Type="{REL}/slide" Target="../slides/slide{n}.xml"/></Relationships>"#
    )
}

// -- Package-level parts ------------------------------------------------------

/// Slide numbers (1-based) that carry a notes page.
pub fn content_types_xml(slide_count: usize, notes: &[usize]) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="jpeg" ContentType="image/jpeg"/><Override PartName="/ppt/presentation.xml" ContentType="{CT_PML}.presentation.main+xml"/><Override PartName="/ppt/presProps.xml" ContentType="{CT_PML}.presProps+xml"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="{CT_PML}.slideMaster+xml"/><Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="{CT_PML}.slideLayout+xml"/><Override PartName="/ppt/notesMasters/notesMaster1.xml" ContentType="{CT_PML}.notesMaster+xml"/><Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/><Override PartName="/ppt/theme/theme2.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/><Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#
    );
    for n in 1..=slide_count {
        xml.push_str(&format!(
            r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="{CT_PML}.slide+xml"/>"#
        ));
    }
    for n in notes {
        xml.push_str(&format!(
            r#"<Override PartName="/ppt/notesSlides/notesSlide{n}.xml" ContentType="{CT_PML}.notesSlide+xml"/>"#
        ));
    }
    xml.push_str("</Types>");
    xml
}

pub fn root_rels_xml() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL}/officeDocument" Target="ppt/presentation.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="{REL}/extended-properties" Target="docProps/app.xml"/></Relationships>"#
    )
}

pub fn core_props_xml(title: &str) -> String {
    format!(
        r#"{XML_DECL}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{}</dc:title><dc:creator>folienwerk</dc:creator></cp:coreProperties>"#,
        xml_text(title)
    )
}

pub fn app_props_xml(slide_count: usize) -> String {
    format!(
        r#"{XML_DECL}<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>folienwerk</Application><Slides>{slide_count}</Slides></Properties>"#
    )
}

/// The presentation part. Relationship ids: `rId1` master, `rId2` notes
/// master, `rId3` theme, `rId4` properties, `rId5..` slides.
pub fn presentation_xml(slide_count: usize, slide_size: (i64, i64)) -> String {
    let mut ids = String::new();
    for n in 0..slide_count {
        ids.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + n, 5 + n));
    }
    format!(
        r#"{XML_DECL}<p:presentation {NS} saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:notesMasterIdLst><p:notesMasterId r:id="rId2"/></p:notesMasterIdLst><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="{}" cy="{}"/><p:notesSz cx="{}" cy="{}"/></p:presentation>"#,
        slide_size.0, slide_size.1, NOTES_SIZE.0, NOTES_SIZE.1
    )
}

pub fn presentation_rels_xml(slide_count: usize) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL}/slideMaster" Target="slideMasters/slideMaster1.xml"/><Relationship Id="rId2" Type="{REL}/notesMaster" Target="notesMasters/notesMaster1.xml"/><Relationship Id="rId3" Type="{REL}/theme" Target="theme/theme1.xml"/><Relationship Id="rId4" Type="{REL}/presProps" Target="presProps.xml"/>"#
    );
    for n in 1..=slide_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{REL}/slide" Target="slides/slide{n}.xml"/>"#,
            n + 4
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

pub fn pres_props_xml() -> String {
    format!(r#"{XML_DECL}<p:presentationPr {NS}/>"#)
}

pub fn slide_master_xml() -> String {
    format!(
        r#"{XML_DECL}<p:sldMaster {NS}><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree>{EMPTY_GROUP}</p:spTree></p:cSld>{CLR_MAP}<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst><p:txStyles><p:titleStyle><a:lvl1pPr><a:defRPr sz="4400"/></a:lvl1pPr></p:titleStyle><p:bodyStyle><a:lvl1pPr><a:defRPr sz="1800"/></a:lvl1pPr></p:bodyStyle><p:otherStyle><a:lvl1pPr><a:defRPr sz="1800"/></a:lvl1pPr></p:otherStyle></p:txStyles></p:sldMaster>"#
    )
}

pub fn slide_master_rels_xml() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="{REL}/theme" Target="../theme/theme1.xml"/></Relationships>"#
    )
}

pub fn slide_layout_xml() -> String {
    format!(
        r#"{XML_DECL}<p:sldLayout {NS} type="blank" preserve="1"><p:cSld name="Blank"><p:spTree>{EMPTY_GROUP}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#
    )
}

pub fn slide_layout_rels_xml() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL}/slideMaster" Target="../slideMasters/slideMaster1.xml"/></Relationships>"#
    )
}

pub fn notes_master_xml() -> String {
    let image = xfrm(EmuRect {
        x: 381_000,
        y: 685_800,
        cx: 6_096_000,
        cy: 3_429_000,
    });
    let body = xfrm(EmuRect {
        x: 685_800,
        y: 4_343_400,
        cx: 5_486_400,
        cy: 4_114_800,
    });
    format!(
        r#"{XML_DECL}<p:notesMaster {NS}><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree>{EMPTY_GROUP}<p:sp><p:nvSpPr><p:cNvPr id="2" name="Slide Image Placeholder 1"/><p:cNvSpPr><a:spLocks noGrp="1" noRot="1" noChangeAspect="1"/></p:cNvSpPr><p:nvPr><p:ph type="sldImg" idx="2"/></p:nvPr></p:nvSpPr><p:spPr>{image}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr></p:sp><p:sp><p:nvSpPr><p:cNvPr id="3" name="Notes Placeholder 2"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="body" sz="quarter" idx="3"/></p:nvPr></p:nvSpPr><p:spPr>{body}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr><p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:endParaRPr lang="zh-TW"/></a:p></p:txBody></p:sp></p:spTree></p:cSld>{CLR_MAP}<p:notesStyle><a:lvl1pPr><a:defRPr sz="1200"/></a:lvl1pPr></p:notesStyle></p:notesMaster>"#
    )
}

pub fn notes_master_rels_xml() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL}/theme" Target="../theme/theme2.xml"/></Relationships>"#
    )
}

/// A plain Office-style theme.
pub fn theme_xml(name: &str) -> String {
    const COLORS: [(&str, &str); 10] = [
        ("accent1", "4472C4"),
        ("accent2", "ED7D31"),
        ("accent3", "A5A5A5"),
        ("accent4", "FFC000"),
        ("accent5", "5B9BD5"),
        ("accent6", "70AD47"),
        ("hlink", "0563C1"),
        ("folHlink", "954F72"),
        ("dk2", "44546A"),
        ("lt2", "E7E6E6"),
    ];
    let color = |key: &str| {
        COLORS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, hex)| *hex)
            .unwrap_or("000000")
    };
    let srgb = |key: &str| format!(r#"<a:{key}><a:srgbClr val="{}"/></a:{key}>"#, color(key));
    let mut scheme = String::from(
        r#"<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>"#,
    );
    for key in [
        "dk2", "lt2", "accent1", "accent2", "accent3", "accent4", "accent5", "accent6", "hlink",
        "folHlink",
    ] {
        scheme.push_str(&srgb(key));
    }

    let fill = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    let line = r#"<a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#;
    let effect = "<a:effectStyle><a:effectLst/></a:effectStyle>";
    format!(
        r#"{XML_DECL}<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="{}"><a:themeElements><a:clrScheme name="Office">{scheme}</a:clrScheme><a:fontScheme name="Office"><a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Office"><a:fillStyleLst>{fill}{fill}{fill}</a:fillStyleLst><a:lnStyleLst>{line}{line}{line}</a:lnStyleLst><a:effectStyleLst>{effect}{effect}{effect}</a:effectStyleLst><a:bgFillStyleLst>{fill}{fill}{fill}</a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#,
        xml_text(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emu_conversion_truncates() {
        assert_eq!(to_emu(1.0), 12_700);
        assert_eq!(to_emu(720.0), 9_144_000);
        assert_eq!(
            EmuRect::from_points(10.0, 20.0, 30.5, 0.5),
            EmuRect {
                x: 127_000,
                y: 254_000,
                cx: 387_350,
                cy: 6_350
            }
        );
    }

    #[test]
    fn slide_text_is_escaped() {
        let xml = slide_xml(
            EmuRect::from_points(0.0, 0.0, 720.0, 405.0),
            &[TextBox {
                rect: EmuRect::from_points(10.0, 10.0, 100.0, 20.0),
                text: "R&D <2026>\u{7}",
                size: 1800,
                fill: RunFill::Solid("336699"),
            }],
        );
        assert!(xml.contains("<a:t>R&amp;D &lt;2026&gt;</a:t>"));
        assert!(xml.contains(r#"sz="1800""#));
        assert!(xml.contains(r#"<a:srgbClr val="336699"/>"#));
        assert!(xml.contains(r#"typeface="Microsoft JhengHei""#));
        assert!(xml.contains(r#"wrap="square""#));
    }

    #[test]
    fn overlay_runs_have_no_fill() {
        let xml = slide_xml(
            EmuRect::from_points(0.0, 0.0, 100.0, 100.0),
            &[TextBox {
                rect: EmuRect::from_points(0.0, 0.0, 50.0, 20.0),
                text: "ghost",
                size: 1200,
                fill: RunFill::None,
            }],
        );
        assert!(xml.contains(r#"dirty="0"><a:noFill/><a:latin"#));
        assert!(!xml.contains("srgbClr"));
    }

    #[test]
    fn notes_become_paragraphs() {
        let xml = notes_slide_xml("first\nsecond & third");
        assert_eq!(xml.matches("<a:p>").count(), 2);
        assert!(xml.contains("<a:t>second &amp; third</a:t>"));
    }

    #[test]
    fn presentation_lists_slides_in_order() {
        let xml = presentation_xml(2, (9_144_000, 5_143_500));
        assert!(xml.contains(r#"<p:sldId id="256" r:id="rId5"/><p:sldId id="257" r:id="rId6"/>"#));
        assert!(xml.contains(r#"<p:sldSz cx="9144000" cy="5143500"/>"#));
        let rels = presentation_rels_xml(2);
        assert!(rels.contains(r#"Id="rId6" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide2.xml""#));
    }

    #[test]
    fn content_types_and_rels_list_every_part() {
        let types = content_types_xml(2, &[2]);
        assert!(types.contains(r#"PartName="/ppt/slides/slide1.xml""#));
        assert!(types.contains(r#"PartName="/ppt/slides/slide2.xml""#));
        assert_eq!(types.matches("/ppt/notesSlides/").count(), 1);
        assert!(types.ends_with("</Types>"));

        let with_notes = slide_rels_xml(2, true);
        assert!(with_notes.contains(r#"Target="../notesSlides/notesSlide2.xml""#));
        assert!(with_notes.ends_with("</Relationships>"));
        assert!(!slide_rels_xml(1, false).contains("notesSlide"));
    }
}
