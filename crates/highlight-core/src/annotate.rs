//! Highlight annotations on an in-memory document

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::HighlightError;
use crate::text_layer::Rect;

/// Add a yellow `Highlight` annotation covering `rect` to a page
pub fn add_highlight_annotation(
    doc: &mut Document,
    page_id: ObjectId,
    page_number: u32,
    rect: &Rect,
    opacity: f64,
) -> Result<(), HighlightError> {
    let mut annot = Dictionary::new();
    annot.set("Type", Object::Name(b"Annot".to_vec()));
    annot.set("Subtype", Object::Name(b"Highlight".to_vec()));
    annot.set(
        "Rect",
        Object::Array(vec![
            Object::Real(rect.x0 as f32),
            Object::Real(rect.y0 as f32),
            Object::Real(rect.x1 as f32),
            Object::Real(rect.y1 as f32),
        ]),
    );
    // Quad order: upper-left, upper-right, lower-left, lower-right
    annot.set(
        "QuadPoints",
        Object::Array(vec![
            Object::Real(rect.x0 as f32),
            Object::Real(rect.y1 as f32),
            Object::Real(rect.x1 as f32),
            Object::Real(rect.y1 as f32),
            Object::Real(rect.x0 as f32),
            Object::Real(rect.y0 as f32),
            Object::Real(rect.x1 as f32),
            Object::Real(rect.y0 as f32),
        ]),
    );
    annot.set("CA", Object::Real(opacity as f32));
    annot.set(
        "C",
        Object::Array(vec![
            Object::Real(1.0),
            Object::Real(1.0),
            Object::Real(0.0),
        ]),
    );
    annot.set("P", Object::Reference(page_id));

    let annot_id = doc.add_object(Object::Dictionary(annot));
    add_annotation_to_page(doc, page_id, page_number, annot_id)
}

fn add_annotation_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    page_number: u32,
    annot_id: ObjectId,
) -> Result<(), HighlightError> {
    // Annots may be an indirect array shared by reference
    let indirect = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .and_then(|dict| dict.get(b"Annots"))
        .ok()
        .and_then(|annots| match annots {
            Object::Reference(id) => Some(*id),
            _ => None,
        });
    if let Some(array_id) = indirect {
        if let Ok(Object::Array(arr)) = doc.get_object_mut(array_id) {
            arr.push(Object::Reference(annot_id));
            return Ok(());
        }
    }

    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| HighlightError::AnnotationError {
            page: page_number,
            reason: e.to_string(),
        })?;
    let page_dict = page
        .as_dict_mut()
        .map_err(|e| HighlightError::AnnotationError {
            page: page_number,
            reason: e.to_string(),
        })?;

    if let Ok(Object::Array(arr)) = page_dict.get_mut(b"Annots") {
        arr.push(Object::Reference(annot_id));
    } else {
        page_dict.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
    }
    Ok(())
}

/// Serialize the document
pub fn save(doc: &mut Document) -> Result<Vec<u8>, HighlightError> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| HighlightError::SaveError(e.to_string()))?;
    Ok(output)
}
