//! Target descriptions generated from a backend's register map.

use crate::arch::CpuBackend;
use crate::protocol::ReplyBuffer;

/// Feature used for registers that do not name one.
const FALLBACK_FEATURE: &str = "org.gdbproxy.regs";

/// Render `target.xml` for `backend`.
///
/// Consecutive registers sharing a feature are grouped into one `<feature>`
/// element, which starts with the backend's type definitions for it.
pub(crate) fn write_target_xml(backend: &dyn CpuBackend, out: &mut ReplyBuffer) {
    out.write_str(r#"<?xml version="1.0"?>"#);
    out.write_str(r#"<!DOCTYPE target SYSTEM "gdb-target.dtd">"#);
    out.write_str(r#"<target version="1.0"><architecture>"#);
    out.write_xml_escaped(backend.architecture());
    out.write_str("</architecture>");

    let mut current: Option<&str> = None;
    for (regnum, reg) in backend.register_map().iter().enumerate() {
        let feature = reg.feature.unwrap_or(FALLBACK_FEATURE);
        if current != Some(feature) {
            if current.is_some() {
                out.write_str("</feature>");
            }
            out.write_str(r#"<feature name=""#);
            out.write_xml_escaped(feature);
            out.write_str(r#"">"#);
            out.write_str(backend.target_xml_types(feature));
            current = Some(feature);
        }

        out.write_str(r#"<reg name=""#);
        out.write_xml_escaped(reg.name);
        out.write_str(r#"" bitsize=""#);
        out.write_dec(reg.bitsize() as u64);
        if let Some(kind) = reg.kind {
            out.write_str(r#"" type=""#);
            out.write_xml_escaped(kind);
        }
        out.write_str(r#"" regnum=""#);
        out.write_dec(regnum as u64);
        out.write_str(r#""/>"#);
    }
    if current.is_some() {
        out.write_str("</feature>");
    }

    out.write_str("</target>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Machine;

    fn render(machine: Machine) -> String {
        let mut out = ReplyBuffer::new();
        write_target_xml(machine.backend(), &mut out);
        String::from_utf8(out.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn every_register_is_described() {
        for machine in Machine::ALL.iter().copied() {
            let xml = render(machine);
            let backend = machine.backend();
            assert_eq!(
                xml.matches("<reg ").count(),
                backend.register_map().len(),
                "{:?}",
                machine
            );
            assert_eq!(xml.matches("<feature ").count(), xml.matches("</feature>").count());
            assert!(xml.contains(&format!(
                "<architecture>{}</architecture>",
                backend.architecture()
            )));
        }
    }

    #[test]
    fn amd64_description() {
        let xml = render(Machine::Amd64);
        assert!(xml.starts_with(r#"<?xml version="1.0"?>"#));
        assert!(xml.contains(r#"<feature name="org.gnu.gdb.i386.core"><flags id="i386_eflags""#));
        let pc = Machine::Amd64.backend().pc_regnum();
        assert!(xml.contains(&format!(
            r#"<reg name="rip" bitsize="64" type="code_ptr" regnum="{}"/>"#,
            pc
        )));
        assert!(xml.ends_with("</target>"));
    }
}
