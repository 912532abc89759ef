//! URDF reader producing [`Chain`]s.
//!
//! Only the kinematic skeleton is consumed: link names, the first visual geometry of
//! each link, and each joint's parent, child and origin. Everything else in the
//! document (inertial, collision, materials, gazebo and transmission blocks) is
//! skipped.

use crate::chain::{Chain, GeometryTag, Link};
use crate::error::{ChainError, Result};
use glam::Vec3;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::BufRead;
use std::path::Path;

/// A joint as declared in the document, before it is folded into its child link.
struct RawJoint {
    name: String,
    parent: String,
    child: String,
    xyz: Vec3,
    rpy: Vec3,
}

/// Reads and parses a URDF file.
///
/// # Errors
///
/// Returns [`ChainError::Io`] if the file cannot be read, otherwise the same errors as
/// [`parse_str`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<Chain> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|source| ChainError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&xml)
}

/// Parses a URDF document held in memory.
///
/// # Errors
///
/// Fails on malformed XML, a missing `robot` element, missing or invalid attributes,
/// and any structural problem reported by [`Chain::from_links`].
pub fn parse_str(xml: &str) -> Result<Chain> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"robot" => {
                let name = get_attribute(e, "name")?;
                let (links, joints) = parse_robot(&mut reader)?;
                return assemble(name, fold_joints(links, joints)?);
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"robot" => {
                return Err(ChainError::NoRootLink);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ChainError::Xml(e.to_string())),
        }
        buf.clear();
    }

    Err(ChainError::missing_element("robot", "URDF document"))
}

fn parse_robot<R: BufRead>(reader: &mut Reader<R>) -> Result<(Vec<Link>, Vec<RawJoint>)> {
    let mut links = Vec::new();
    let mut joints = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let elem_name = e.name().as_ref().to_vec();
                match elem_name.as_slice() {
                    b"link" => {
                        let name = get_attribute(e, "name")?;
                        links.push(parse_link(reader, name)?);
                    }
                    b"joint" => {
                        let name = get_attribute(e, "name")?;
                        joints.push(parse_joint(reader, name)?);
                    }
                    _ => skip_element(reader, &elem_name)?,
                }
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"link" => {
                links.push(Link::root(get_attribute(e, "name")?));
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"joint" => {
                let name = get_attribute(e, "name")?;
                return Err(ChainError::missing_element("parent", format!("joint '{name}'")));
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"robot" => break,
            Ok(Event::Eof) => return Err(ChainError::Xml("unexpected EOF in robot".into())),
            Ok(_) => {}
            Err(e) => return Err(ChainError::Xml(e.to_string())),
        }
        buf.clear();
    }

    Ok((links, joints))
}

fn parse_link<R: BufRead>(reader: &mut Reader<R>, name: String) -> Result<Link> {
    let mut link = Link::root(name);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let elem_name = e.name().as_ref().to_vec();
                if elem_name == b"visual" {
                    let geometry = parse_visual(reader)?;
                    // First visual wins.
                    if link.geometry.is_none() {
                        link.geometry = geometry;
                    }
                } else {
                    skip_element(reader, &elem_name)?;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"link" => break,
            Ok(Event::Eof) => return Err(ChainError::Xml("unexpected EOF in link".into())),
            Ok(_) => {}
            Err(e) => return Err(ChainError::Xml(e.to_string())),
        }
        buf.clear();
    }

    Ok(link)
}

fn parse_visual<R: BufRead>(reader: &mut Reader<R>) -> Result<Option<GeometryTag>> {
    let mut geometry = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"geometry" => {
                geometry = parse_geometry(reader)?;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"visual" => break,
            Ok(Event::Eof) => return Err(ChainError::Xml("unexpected EOF in visual".into())),
            Ok(_) => {}
            Err(e) => return Err(ChainError::Xml(e.to_string())),
        }
        buf.clear();
    }

    Ok(geometry)
}

fn parse_geometry<R: BufRead>(reader: &mut Reader<R>) -> Result<Option<GeometryTag>> {
    let mut geometry = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"mesh" => geometry = Some(GeometryTag::Mesh(get_attribute(e, "filename")?)),
                b"box" => {
                    let size = parse_vec3(&get_attribute(e, "size")?, "size", "box")?;
                    geometry = Some(GeometryTag::Box(size));
                }
                b"cylinder" => {
                    geometry = Some(GeometryTag::Cylinder {
                        radius: parse_float_attr(e, "radius")?,
                        length: parse_float_attr(e, "length")?,
                    });
                }
                b"sphere" => geometry = Some(GeometryTag::Sphere(parse_float_attr(e, "radius")?)),
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"geometry" => break,
            Ok(Event::Eof) => return Err(ChainError::Xml("unexpected EOF in geometry".into())),
            Ok(_) => {}
            Err(e) => return Err(ChainError::Xml(e.to_string())),
        }
        buf.clear();
    }

    Ok(geometry)
}

fn parse_joint<R: BufRead>(reader: &mut Reader<R>, name: String) -> Result<RawJoint> {
    let mut parent = None;
    let mut child = None;
    let mut xyz = Vec3::ZERO;
    let mut rpy = Vec3::ZERO;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"parent" => parent = Some(get_attribute(e, "link")?),
                b"child" => child = Some(get_attribute(e, "link")?),
                b"origin" => {
                    if let Some(s) = get_attribute_opt(e, "xyz") {
                        xyz = parse_vec3(&s, "xyz", "origin")?;
                    }
                    if let Some(s) = get_attribute_opt(e, "rpy") {
                        rpy = parse_vec3(&s, "rpy", "origin")?;
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"joint" => break,
            Ok(Event::Eof) => return Err(ChainError::Xml("unexpected EOF in joint".into())),
            Ok(_) => {}
            Err(e) => return Err(ChainError::Xml(e.to_string())),
        }
        buf.clear();
    }

    let parent =
        parent.ok_or_else(|| ChainError::missing_element("parent", format!("joint '{name}'")))?;
    let child =
        child.ok_or_else(|| ChainError::missing_element("child", format!("joint '{name}'")))?;

    Ok(RawJoint {
        name,
        parent,
        child,
        xyz,
        rpy,
    })
}

/// Moves each joint's parent and origin onto its child link.
fn fold_joints(mut links: Vec<Link>, joints: Vec<RawJoint>) -> Result<Vec<Link>> {
    let positions: HashMap<String, usize> = links
        .iter()
        .enumerate()
        .map(|(i, l)| (l.name.clone(), i))
        .collect();

    let mut joint_names = HashSet::new();
    for joint in joints {
        if !joint_names.insert(joint.name.clone()) {
            return Err(ChainError::DuplicateJoint(joint.name));
        }
        if !positions.contains_key(&joint.parent) {
            return Err(ChainError::undefined_link(joint.parent, joint.name));
        }
        let Some(&child) = positions.get(&joint.child) else {
            return Err(ChainError::undefined_link(joint.child, joint.name));
        };

        let link = &mut links[child];
        if link.parent.is_some() {
            return Err(ChainError::MultipleParents(joint.child));
        }
        link.parent = Some(joint.parent);
        link.joint = Some(joint.name);
        link.offset = joint.xyz;
        link.rpy = joint.rpy;
    }

    Ok(links)
}

/// Validates a set of links and orders them parents-before-children.
///
/// Children keep their declaration order under each parent, so the resulting arena
/// order is a pure function of the input.
pub(crate) fn assemble(name: String, links: Vec<Link>) -> Result<Chain> {
    let mut seen = HashSet::new();
    for link in &links {
        if !seen.insert(link.name.as_str()) {
            return Err(ChainError::DuplicateLink(link.name.clone()));
        }
    }

    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (i, link) in links.iter().enumerate() {
        match &link.parent {
            Some(parent) if !seen.contains(parent.as_str()) => {
                let joint = link.joint.clone().unwrap_or_else(|| link.name.clone());
                return Err(ChainError::undefined_link(parent.clone(), joint));
            }
            Some(parent) => children.entry(parent.as_str()).or_default().push(i),
            None => roots.push(i),
        }
    }

    let root = match roots.as_slice() {
        [] => return Err(ChainError::NoRootLink),
        [root] => *root,
        _ => {
            return Err(ChainError::MultipleRootLinks(
                roots.iter().map(|&i| links[i].name.clone()).collect(),
            ));
        }
    };

    // Breadth-first from the root; anything left over sits on a loop.
    let mut order = Vec::with_capacity(links.len());
    let mut visited = vec![false; links.len()];
    let mut queue = VecDeque::from([root]);
    while let Some(i) = queue.pop_front() {
        visited[i] = true;
        order.push(i);
        if let Some(kids) = children.get(links[i].name.as_str()) {
            queue.extend(kids.iter().copied());
        }
    }

    if order.len() != links.len() {
        let stranded = links
            .iter()
            .zip(&visited)
            .filter(|(_, v)| !**v)
            .map(|(l, _)| l.name.clone())
            .collect();
        return Err(ChainError::KinematicLoop(stranded));
    }

    let mut slots: Vec<Option<Link>> = links.into_iter().map(Some).collect();
    let sorted = order.into_iter().filter_map(|i| slots[i].take()).collect();
    Ok(Chain::from_sorted(name, sorted))
}

// ============================================================================
// Attribute helpers
// ============================================================================

fn get_attribute(e: &BytesStart, name: &'static str) -> Result<String> {
    get_attribute_opt(e, name).ok_or_else(|| ChainError::missing_attribute(name, element_name(e)))
}

fn get_attribute_opt(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_float_attr(e: &BytesStart, name: &'static str) -> Result<f32> {
    let value = get_attribute(e, name)?;
    value
        .trim()
        .parse()
        .map_err(|_| ChainError::invalid_attribute(name, element_name(e), "expected a number"))
}

/// Parses a space-separated triple such as `"0.5 0 0.1"`.
fn parse_vec3(s: &str, attribute: &'static str, element: &str) -> Result<Vec3> {
    let parts = s
        .split_whitespace()
        .map(str::parse::<f32>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| ChainError::invalid_attribute(attribute, element, format!("'{s}'")))?;

    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(ChainError::invalid_attribute(
            attribute,
            element,
            format!("expected 3 values, got {}", parts.len()),
        )),
    }
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

fn skip_element<R: BufRead>(reader: &mut Reader<R>, name: &[u8]) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == name => depth += 1,
            Ok(Event::End(ref e)) if e.name().as_ref() == name => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ChainError::Xml(e.to_string())),
        }
        buf.clear();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TUG: &str = r#"
        <robot name="t5">
            <material name="red"><color rgba="0.8 0.1 0.1 1"/></material>
            <link name="base_link">
                <inertial><mass value="1200"/></inertial>
                <visual>
                    <origin xyz="0 0 0"/>
                    <geometry><mesh filename="package://tugs/t5.stl"/></geometry>
                    <material name="red"/>
                </visual>
            </link>
            <link name="steering"/>
            <link name="caster">
                <visual><geometry><cylinder radius="0.1" length="0.05"/></geometry></visual>
            </link>
            <joint name="steer_joint" type="revolute">
                <parent link="base_link"/>
                <child link="steering"/>
                <origin xyz="0.3 0 0.1" rpy="0 0 1.5708"/>
                <limit lower="-1" upper="1" effort="10" velocity="1"/>
            </joint>
            <joint name="caster_joint" type="fixed">
                <parent link="steering"/>
                <child link="caster"/>
                <origin xyz="0.2 0 -0.1"/>
            </joint>
        </robot>
    "#;

    #[test]
    fn test_parse_tug() {
        let chain = parse_str(TUG).expect("should parse");
        assert_eq!(chain.name, "t5");
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.root().name, "base_link");

        let caster = chain.link("caster").expect("caster link");
        assert_eq!(caster.parent.as_deref(), Some("steering"));
        assert_eq!(caster.joint.as_deref(), Some("caster_joint"));
        assert_eq!(caster.offset, Vec3::new(0.2, 0.0, -0.1));
        assert_eq!(
            caster.geometry,
            Some(GeometryTag::Cylinder {
                radius: 0.1,
                length: 0.05
            })
        );

        let steering = chain.link("steering").expect("steering link");
        assert_eq!(steering.rpy, Vec3::new(0.0, 0.0, 1.5708));
        assert_eq!(
            chain.root().geometry,
            Some(GeometryTag::Mesh("package://tugs/t5.stl".into()))
        );
    }

    #[test]
    fn test_parents_precede_children() {
        // Joints and links declared in reverse order.
        let xml = r#"
            <robot name="r">
                <joint name="j2" type="fixed"><parent link="b"/><child link="c"/></joint>
                <joint name="j1" type="fixed"><parent link="a"/><child link="b"/></joint>
                <link name="c"/>
                <link name="b"/>
                <link name="a"/>
            </robot>
        "#;
        let chain = parse_str(xml).expect("should parse");
        let names: Vec<&str> = chain.links().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(chain.depth_of(chain.id_of("c").unwrap()), 2);
    }

    #[test]
    fn test_duplicate_link() {
        let xml = r#"<robot name="r"><link name="a"/><link name="a"/></robot>"#;
        assert!(matches!(parse_str(xml), Err(ChainError::DuplicateLink(n)) if n == "a"));
    }

    #[test]
    fn test_undefined_parent() {
        let xml = r#"
            <robot name="r">
                <link name="a"/>
                <joint name="j" type="fixed"><parent link="ghost"/><child link="a"/></joint>
            </robot>
        "#;
        assert!(matches!(
            parse_str(xml),
            Err(ChainError::UndefinedLink { link, joint }) if link == "ghost" && joint == "j"
        ));
    }

    #[test]
    fn test_multiple_roots() {
        let xml = r#"<robot name="r"><link name="a"/><link name="b"/></robot>"#;
        assert!(matches!(parse_str(xml), Err(ChainError::MultipleRootLinks(r)) if r.len() == 2));
    }

    #[test]
    fn test_no_root() {
        let xml = r#"
            <robot name="r">
                <link name="a"/><link name="b"/>
                <joint name="j1" type="fixed"><parent link="a"/><child link="b"/></joint>
                <joint name="j2" type="fixed"><parent link="b"/><child link="a"/></joint>
            </robot>
        "#;
        assert!(matches!(parse_str(xml), Err(ChainError::NoRootLink)));
    }

    #[test]
    fn test_loop_off_the_root() {
        let xml = r#"
            <robot name="r">
                <link name="root"/><link name="a"/><link name="b"/>
                <joint name="j1" type="fixed"><parent link="a"/><child link="b"/></joint>
                <joint name="j2" type="fixed"><parent link="b"/><child link="a"/></joint>
            </robot>
        "#;
        assert!(matches!(parse_str(xml), Err(ChainError::KinematicLoop(l)) if l.len() == 2));
    }

    #[test]
    fn test_two_parents() {
        let xml = r#"
            <robot name="r">
                <link name="a"/><link name="b"/><link name="c"/>
                <joint name="j1" type="fixed"><parent link="a"/><child link="c"/></joint>
                <joint name="j2" type="fixed"><parent link="b"/><child link="c"/></joint>
            </robot>
        "#;
        assert!(matches!(parse_str(xml), Err(ChainError::MultipleParents(n)) if n == "c"));
    }

    #[test]
    fn test_self_closing_joint() {
        let xml = r#"
            <robot name="r">
                <link name="a"/><link name="b"/>
                <joint name="j1" type="fixed"><parent link="a"/><child link="b"/></joint>
                <joint name="j1" type="fixed"/>
            </robot>
        "#;
        assert!(matches!(
            parse_str(xml),
            Err(ChainError::MissingElement { element: "parent", context }) if context == "joint 'j1'"
        ));
    }

    #[test]
    fn test_escaped_attributes() {
        let xml = r#"
            <robot name="r&amp;d">
                <link name="base">
                    <visual><geometry><mesh filename="meshes/nose&amp;gear.stl"/></geometry></visual>
                </link>
            </robot>
        "#;
        let chain = parse_str(xml).expect("should parse");
        assert_eq!(chain.name, "r&d");
        assert_eq!(
            chain.root().geometry,
            Some(GeometryTag::Mesh("meshes/nose&gear.stl".into()))
        );
    }

    #[test]
    fn test_bad_origin() {
        let xml = r#"
            <robot name="r">
                <link name="a"/><link name="b"/>
                <joint name="j" type="fixed">
                    <parent link="a"/><child link="b"/><origin xyz="1 2"/>
                </joint>
            </robot>
        "#;
        assert!(matches!(
            parse_str(xml),
            Err(ChainError::InvalidAttribute { attribute: "xyz", .. })
        ));
    }

    #[test]
    fn test_missing_robot() {
        assert!(matches!(
            parse_str("<model name=\"x\"/>"),
            Err(ChainError::MissingElement { element: "robot", .. })
        ));
        assert!(matches!(parse_str("<robot name=\"r\"><link name=\"a\">"), Err(_)));
    }
}
