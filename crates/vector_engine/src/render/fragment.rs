//! Fragments: a material, its buffers and the display list that draws them
//!
//! Fragment records look like this:
//!
//! ```text
//! Fragment
//! {
//!     Material "hull"
//!     PCBuffer
//!     {
//!         0 0 0  1 1 1 1
//!         1 0 0  1 1 1 1
//!         0 1 0  1 1 1 1
//!     }
//!     IndexBuffer { 0 1 2 }
//!     DisplayList
//!     {
//!         BindBuffer 0
//!         TriangleListBuffer 1
//!         ClearArrays
//!     }
//! }
//! ```
//!
//! Buffers are numbered in the order they appear; buffer-referencing ops in
//! the `DisplayList` block use those numbers.

use crate::assets::record::Record;
use crate::foundation::bounds::Box3D;
use crate::render::buffer::{BufferContents, BufferId, BufferStore, PcVertex, PctVertex, PntVertex, RenderBuffer};
use crate::render::display_list::op::Primitive;
use crate::render::display_list::{DisplayList, Op};
use crate::render::import::import_into;
use crate::render::material::{Material, MaterialLibrary};
use crate::render::{RenderError, RenderResult};

/// Geometry drawn with one material
#[derive(Debug, Clone)]
pub struct Fragment {
    material: Material,
    buffers: Vec<BufferId>,
    display_list: DisplayList,
    /// Draw ops alone, when the list is `BindBuffer(v) .. ClearArrays`
    shared: Option<(BufferId, DisplayList)>,
    bounds: Option<Box3D>,
    /// Hidden fragments are skipped by sprites
    pub visible: bool,
}

impl Fragment {
    /// Wrap a display list that draws from `buffers`
    pub fn new(material: Material, display_list: DisplayList, buffers: Vec<BufferId>, store: &BufferStore) -> Self {
        let bounds = display_list.bounding_box_with(store);
        let shared = split_shared_buffer(&display_list);
        Self {
            material,
            buffers,
            display_list,
            shared,
            bounds,
            visible: true,
        }
    }

    /// Fragment drawing `indices` from `vertices` as one primitive
    pub fn from_buffers(
        material: Material,
        vertices: BufferId,
        indices: BufferId,
        primitive: Primitive,
        store: &BufferStore,
    ) -> Self {
        let mut list = DisplayList::new();
        list.bind_buffer(vertices);
        list.write_op(&buffer_draw(primitive, indices));
        list.clear_arrays();
        Self::new(material, list, vec![vertices, indices], store)
    }

    /// Material the fragment draws with
    pub fn material(&self) -> Material {
        self.material
    }

    /// Full display list, including its own buffer bind
    pub fn display_list(&self) -> &DisplayList {
        &self.display_list
    }

    /// Buffers the fragment owns, in load order
    pub fn buffers(&self) -> &[BufferId] {
        &self.buffers
    }

    /// Bounds of every vertex the fragment draws
    pub fn bounding_box(&self) -> Option<Box3D> {
        self.bounds
    }

    /// Vertex buffer the whole fragment draws from, if there is exactly one
    pub fn shared_vertex_buffer(&self) -> Option<BufferId> {
        self.shared.as_ref().map(|(buffer, _)| *buffer)
    }

    /// What to hand the render queue
    ///
    /// When the fragment binds a single vertex buffer the bind and clear are
    /// left to the queue, which then shares them with other fragments using
    /// the same buffer.
    pub fn batch_list(&self) -> (Option<BufferId>, DisplayList) {
        match &self.shared {
            Some((buffer, draws)) => (Some(*buffer), draws.create_instance()),
            None => (None, self.display_list.create_instance()),
        }
    }

    /// Remove the fragment's buffers from `store`
    pub fn release_buffers(&mut self, store: &mut BufferStore) {
        for id in self.buffers.drain(..) {
            if store.remove(id).is_none() {
                log::warn!("Fragment buffer {:?} was already released", id);
            }
        }
    }
}

fn buffer_draw(primitive: Primitive, indices: BufferId) -> Op {
    match primitive {
        Primitive::Points => Op::PointBuffer(indices),
        Primitive::LineList => Op::LineListBuffer(indices),
        Primitive::LineStrip => Op::LineStripBuffer(indices),
        Primitive::TriangleList => Op::TriangleListBuffer(indices),
        Primitive::TriangleStrip => Op::TriangleStripBuffer(indices),
        Primitive::TriangleFan => Op::TriangleFanBuffer(indices),
    }
}

fn split_shared_buffer(list: &DisplayList) -> Option<(BufferId, DisplayList)> {
    let ops = list.ops();
    let (first, rest) = ops.split_first()?;
    let (last, middle) = rest.split_last()?;
    let Op::BindBuffer(buffer) = first else {
        return None;
    };
    if *last != Op::ClearArrays || middle.is_empty() || !middle.iter().all(Op::is_draw) {
        return None;
    }
    let mut draws = DisplayList::new();
    for op in middle {
        draws.write_op(op);
    }
    Some((*buffer, draws))
}

const BUFFER_LABELS: [&str; 5] = ["PBuffer", "PCBuffer", "PCTBuffer", "PNTBuffer", "IndexBuffer"];

/// Load a fragment record, adding its buffers to `store`
pub fn load_fragment(record: &Record, store: &mut BufferStore, library: &MaterialLibrary) -> RenderResult<Fragment> {
    let material_record = record.child("Material").ok_or_else(|| RenderError::MissingField {
        record: record.label().to_string(),
        field: "Material".to_string(),
        line: record.line(),
    })?;
    let material = library.get(material_record.string(0)?)?;

    let mut contents = Vec::new();
    for child in record.children() {
        if BUFFER_LABELS.contains(&child.label()) {
            contents.push(read_buffer(child)?);
        }
    }

    let mut display_list = DisplayList::new();
    if let Some(list_record) = record.child("DisplayList") {
        // Dry run against placeholders; a rejected record must leave `store` untouched
        let placeholders = vec![BufferId::default(); contents.len()];
        import_into(&mut display_list, list_record.children(), library, &placeholders)?;
        display_list.clear();
    }

    let buffers: Vec<BufferId> = contents.into_iter().map(|c| store.insert(RenderBuffer::new(c))).collect();
    if let Some(list_record) = record.child("DisplayList") {
        import_into(&mut display_list, list_record.children(), library, &buffers)?;
    } else {
        log::debug!("Fragment on line {} has no display list", record.line());
    }
    display_list.compact();

    log::trace!("Loaded fragment with {} buffers, {} bytes of ops", buffers.len(), display_list.len());
    Ok(Fragment::new(material, display_list, buffers, store))
}

fn read_buffer(record: &Record) -> RenderResult<BufferContents> {
    let invalid = |message: String| RenderError::InvalidValue {
        record: record.label().to_string(),
        message,
    };
    if record.label() == "IndexBuffer" {
        let indices = record
            .child_integers()?
            .into_iter()
            .map(|i| u16::try_from(i).map_err(|_| invalid(format!("index {} out of u16 range", i))))
            .collect::<RenderResult<Vec<u16>>>()?;
        return Ok(BufferContents::Indices(indices));
    }

    let stride = match record.label() {
        "PBuffer" => 3,
        "PCBuffer" => 7,
        "PCTBuffer" => 9,
        _ => 8,
    };
    let values = record.child_floats()?;
    if values.len() % stride != 0 {
        return Err(invalid(format!("{} values is not a multiple of {}", values.len(), stride)));
    }
    let vertices = values.chunks_exact(stride);
    let position = |v: &[f32]| [v[0], v[1], v[2]];
    Ok(match record.label() {
        "PBuffer" => BufferContents::Positions(vertices.map(position).collect()),
        "PCBuffer" => BufferContents::PositionColor(
            vertices
                .map(|v| PcVertex {
                    position: position(v),
                    color: [v[3], v[4], v[5], v[6]],
                })
                .collect(),
        ),
        "PCTBuffer" => BufferContents::PositionColorTexel(
            vertices
                .map(|v| PctVertex {
                    position: position(v),
                    color: [v[3], v[4], v[5], v[6]],
                    texel: [v[7], v[8]],
                })
                .collect(),
        ),
        _ => BufferContents::PositionNormalTexel(
            vertices
                .map(|v| PntVertex {
                    position: position(v),
                    normal: [v[3], v[4], v[5]],
                    texel: [v[6], v[7]],
                })
                .collect(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    const HULL: &str = "\
Fragment
{
    Material \"hull\"
    PCBuffer
    {
        0 0 0  1 1 1 1
        2 0 0  1 1 1 1
        0 3 0  1 1 1 1
    }
    IndexBuffer { 0 1 2 }
    DisplayList
    {
        BindBuffer 0
        TriangleListBuffer 1
        ClearArrays
    }
}
";

    fn library() -> MaterialLibrary {
        let mut library = MaterialLibrary::new();
        library.register("hull", 1, 0);
        library
    }

    #[test]
    fn test_load_fragment() {
        let records = Record::parse_str(HULL).unwrap();
        let library = library();
        let mut store = BufferStore::new();
        let fragment = load_fragment(&records[0], &mut store, &library).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(fragment.material(), library.get("hull").unwrap());
        assert_eq!(fragment.buffers().len(), 2);
        assert!(fragment.visible);

        let vertices = fragment.buffers()[0];
        assert_eq!(fragment.shared_vertex_buffer(), Some(vertices));
        assert_eq!(fragment.display_list().ops()[0], Op::BindBuffer(vertices));

        let bounds = fragment.bounding_box().unwrap();
        assert_relative_eq!(bounds.min, Vec3::zeros());
        assert_relative_eq!(bounds.max, Vec3::new(2.0, 3.0, 0.0));
    }

    #[test]
    fn test_batch_list_strips_shared_bind() {
        let records = Record::parse_str(HULL).unwrap();
        let mut store = BufferStore::new();
        let fragment = load_fragment(&records[0], &mut store, &library()).unwrap();

        let (buffer, list) = fragment.batch_list();
        assert_eq!(buffer, Some(fragment.buffers()[0]));
        assert!(list.is_instance());
        assert_eq!(list.ops(), vec![Op::TriangleListBuffer(fragment.buffers()[1])]);
    }

    #[test]
    fn test_mixed_list_is_not_shared() {
        let mut store = BufferStore::new();
        let vertices = store.insert(RenderBuffer::from_positions(&[Vec3::zeros(), Vec3::x()]));
        let mut list = DisplayList::new();
        list.bind_buffer(vertices);
        list.set_color(crate::foundation::math::Color::RED);
        list.line_list_array(&[0, 1]);
        list.clear_arrays();

        let fragment = Fragment::new(Material::DEFAULT, list, vec![vertices], &store);
        assert_eq!(fragment.shared_vertex_buffer(), None);
        let (buffer, batch) = fragment.batch_list();
        assert_eq!(buffer, None);
        assert_eq!(batch.ops().len(), 4);
    }

    #[test]
    fn test_missing_material_is_error() {
        let records = Record::parse_str("Fragment\n{\n    PBuffer { 0 0 0 }\n}\n").unwrap();
        let mut store = BufferStore::new();
        let err = load_fragment(&records[0], &mut store, &library()).unwrap_err();
        assert!(matches!(err, RenderError::MissingField { ref field, .. } if field == "Material"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_out_of_range_buffer_index() {
        let text = "\
Fragment
{
    Material \"hull\"
    PBuffer { 0 0 0 }
    DisplayList
    {
        BindBuffer 3
    }
}
";
        let records = Record::parse_str(text).unwrap();
        let mut store = BufferStore::new();
        let err = load_fragment(&records[0], &mut store, &library()).unwrap_err();
        assert!(matches!(err, RenderError::InvalidBufferIndex { index: 3, available: 1, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_buffers_and_release() {
        let mut store = BufferStore::new();
        let vertices = store.insert(RenderBuffer::from_positions(&[Vec3::zeros(), Vec3::new(4.0, 0.0, 0.0)]));
        let indices = store.insert(RenderBuffer::from_indices(&[0, 1]));
        let mut fragment = Fragment::from_buffers(Material::DEFAULT, vertices, indices, Primitive::LineList, &store);

        assert_eq!(fragment.shared_vertex_buffer(), Some(vertices));
        assert_relative_eq!(fragment.bounding_box().unwrap().max, Vec3::new(4.0, 0.0, 0.0));

        fragment.release_buffers(&mut store);
        assert!(store.is_empty());
        assert!(fragment.buffers().is_empty());
    }
}
