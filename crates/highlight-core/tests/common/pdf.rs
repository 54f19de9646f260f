//! Synthetic PDFs with a real Helvetica text layer

use lopdf::{content::Content, content::Operation, Dictionary, Document, Object, Stream};

pub const LINE_START: i64 = 720;
pub const LINE_STEP: i64 = 20;

/// Build a PDF with one page per entry; each string is one line of 12pt text
pub fn create_text_pdf(pages: &[&[&str]]) -> Vec<u8> {
    build_pdf(pages, |doc| {
        doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]))
    })
}

/// Same layout, but the font is a Type0 font whose `W` array and ToUnicode
/// CMap use codes at the top of the `u32` range and ranges spanning all of it
pub fn create_malformed_font_pdf(pages: &[&[&str]]) -> Vec<u8> {
    build_pdf(pages, |doc| {
        let cmap = b"/CIDInit /ProcSet findresource begin
            begincmap
            2 beginbfrange
            <00000000> <FFFFFFFF> <0041>
            <FFFFFFFF> <FFFFFFFF> [<0042> <0043>]
            endbfrange
            endcmap"
            .to_vec();
        let to_unicode = doc.add_object(Stream::new(Dictionary::new(), cmap));
        let descendant = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"CIDFontType2".to_vec())),
            (
                "W",
                Object::Array(vec![
                    Object::Integer(4_294_967_295),
                    Object::Array(vec![Object::Integer(500), Object::Integer(500)]),
                    Object::Integer(0),
                    Object::Integer(4_294_967_295),
                    Object::Integer(500),
                ]),
            ),
        ]));
        doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type0".to_vec())),
            ("Encoding", Object::Name(b"Identity-H".to_vec())),
            (
                "DescendantFonts",
                Object::Array(vec![Object::Reference(descendant)]),
            ),
            ("ToUnicode", Object::Reference(to_unicode)),
        ]))
    })
}

fn build_pdf<F>(pages: &[&[&str]], add_font: F) -> Vec<u8>
where
    F: FnOnce(&mut Document) -> lopdf::ObjectId,
{
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = add_font(&mut doc);
    let resources_id = doc.add_object(Dictionary::from_iter(vec![(
        "Font",
        Object::Dictionary(Dictionary::from_iter(vec![(
            "F1",
            Object::Reference(font_id),
        )])),
    )]));

    let mut page_ids = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                ),
                Operation::new(
                    "Td",
                    vec![
                        Object::Integer(72),
                        Object::Integer(LINE_START - LINE_STEP * i as i64),
                    ],
                ),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        line.as_bytes().to_vec(),
                        lopdf::StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    // MediaBox and Resources are inherited from the page tree root
    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
        ("Resources", Object::Reference(resources_id)),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Number of annotations on each page of a PDF, in page order
pub fn annotation_counts(pdf: &[u8]) -> Vec<usize> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|page_id| {
            let page = doc.get_object(*page_id).unwrap().as_dict().unwrap();
            match page.get(b"Annots") {
                Ok(Object::Array(annots)) => annots.len(),
                Ok(Object::Reference(id)) => doc.get_object(*id).unwrap().as_array().unwrap().len(),
                _ => 0,
            }
        })
        .collect()
}
