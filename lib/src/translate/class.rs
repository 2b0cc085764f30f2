use super::{Error, MethodTooLarge, MethodTranslator, Settings};
use crate::ast::{ClassDecl, MethodDecl};
use crate::jvm::class_file::{ClassFile, Field, Method, SourceFile};
use crate::jvm::{
    ClassAccessFlags, ConstantsPool, ConstantsWriter, MethodAccessFlags, Name, RenderDescriptor,
};

/// Generate the class file for one class declaration
///
/// Methods are generated independently of each other. A method which overflows one of the limits
/// of the class file format (code length, stack depth, locals, branch offsets) doesn't stop the
/// others from being generated: every such method is reported in one
/// [`Error::MethodsTooLarge`]. Any other error aborts immediately.
pub fn translate_class(settings: &Settings, class: &ClassDecl) -> Result<ClassFile, Error> {
    log::debug!("Generating class {}", class.name);
    let mut constants = ConstantsPool::new();

    let this_class = class.name.constant_index(&mut constants)?;
    let super_class = class.super_class.constant_index(&mut constants)?;
    let interfaces = class
        .interfaces
        .iter()
        .map(|interface| interface.constant_index(&mut constants))
        .collect::<Result<Vec<_>, _>>()?;

    let mut access_flags = class.access_flags;
    if settings.class_access_super {
        access_flags |= ClassAccessFlags::SUPER;
    }

    let mut fields = vec![];
    for field in &class.fields {
        fields.push(Field {
            access_flags: field.access_flags,
            name_index: constants.get_utf8(field.name.as_str())?,
            descriptor_index: constants.get_utf8(field.field_type.render())?,
            attributes: vec![],
        });
    }

    let mut methods = vec![];
    let mut too_large = vec![];
    for method in &class.methods {
        match translate_method(settings, class, method, &mut constants) {
            Ok(method) => methods.push(method),
            Err(Error::BytecodeGen(error)) if error.is_method_too_large() => {
                let descriptor = method.descriptor().render();
                log::error!(
                    "Method {}.{}{} is too large: {:?}",
                    class.name,
                    method.name,
                    descriptor,
                    error
                );
                too_large.push(MethodTooLarge {
                    class: class.name.clone(),
                    method: method.name.clone(),
                    descriptor,
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }
    if !too_large.is_empty() {
        return Err(Error::MethodsTooLarge(too_large));
    }

    let mut attributes = vec![];
    if let Some(source_file) = settings.source_file.as_ref().or(class.source_file.as_ref()) {
        let name = constants.get_utf8(source_file.as_str())?;
        attributes.push(constants.get_attribute(SourceFile(name))?);
    }

    Ok(ClassFile {
        version: settings.version,
        constants: constants.into_constants(),
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

/// Generate one method, including its `Code` attribute (unless it is abstract)
pub fn translate_method(
    settings: &Settings,
    class: &ClassDecl,
    method: &MethodDecl,
    constants: &mut ConstantsPool,
) -> Result<Method, Error> {
    let descriptor = method.descriptor().render();
    log::debug!("Generating method {}{}", method.name, descriptor);

    let mut attributes = vec![];
    if !method.access_flags.contains(MethodAccessFlags::ABSTRACT) {
        let code = MethodTranslator::new(settings, class, method, constants)?.translate()?;
        let code = code.serialize_code(constants)?;
        log::trace!(
            "Method {} has max_stack = {}, max_locals = {}, code length = {}",
            method.name,
            code.max_stack,
            code.max_locals,
            code.code_array.0.len()
        );
        attributes.push(constants.get_attribute(code)?);
    }

    Ok(Method {
        access_flags: method.access_flags,
        name_index: constants.get_utf8(method.name.as_str())?,
        descriptor_index: constants.get_utf8(descriptor)?,
        attributes,
    })
}
