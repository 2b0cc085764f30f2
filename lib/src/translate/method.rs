use super::code_builder_exts::{value_kind, CodeBuilderExts};
use super::{Error, LocalSlots, Settings};
use crate::ast::{
    BinaryOp, ClassDecl, CompareOp, Expr, ExprKind, LogicalOp, MethodDecl, Stmt, UnaryOp,
};
use crate::jvm::code::{negate_branch, opcode, Code, CodeBuilder, Instruction, Label, Opcode, ValueKind};
use crate::jvm::verifier::{OperandTypes, VerifierFrame, VerifierType};
use crate::jvm::{
    BaseType, BinaryName, ConstantsPool, FieldType, MethodDescriptor, MethodRef, RefType,
    UnqualifiedName,
};

/// Loop which `break` and `continue` can target
struct EnclosingLoop {
    label: Option<String>,
    break_label: Label,
    continue_label: Label,
}

/// Generates the code for the body of one method
///
/// The syntax tree is walked once, top to bottom. Control flow is translated the way `javac`
/// does it: conditions compile to conditional jumps (booleans are only ever materialized on the
/// stack when they are used as values), and loops test their condition at the top.
pub struct MethodTranslator<'a, 'c> {
    settings: &'a Settings,
    class: &'a ClassDecl,
    method: &'a MethodDecl,
    code: CodeBuilder<'c>,
    locals: LocalSlots,

    /// Loops enclosing the current statement (innermost last)
    loops: Vec<EnclosingLoop>,
}

impl<'a, 'c> MethodTranslator<'a, 'c> {
    pub fn new(
        settings: &'a Settings,
        class: &'a ClassDecl,
        method: &'a MethodDecl,
        constants: &'c mut ConstantsPool,
    ) -> Result<MethodTranslator<'a, 'c>, Error> {
        let descriptor = method.descriptor();
        let entry_frame = VerifierFrame::entry(
            &class.this_type(),
            method.is_static(),
            method.is_constructor(),
            &descriptor.parameters,
        );

        let mut locals = LocalSlots::new(usize::from(!method.is_static()));
        for parameter in &method.parameters {
            locals.declare(parameter.local, parameter.param_type.clone())?;
        }

        Ok(MethodTranslator {
            settings,
            class,
            method,
            code: CodeBuilder::new(constants, entry_frame),
            locals,
            loops: vec![],
        })
    }

    /// Translate the whole method body
    pub fn translate(mut self) -> Result<Code, Error> {
        let method = self.method;
        let statements = &method.body.0;

        let explicit_constructor_call =
            matches!(statements.first(), Some(Stmt::ConstructorCall { .. }));
        if method.is_constructor() && self.settings.implicit_super_call && !explicit_constructor_call {
            let super_constructor = MethodRef::constructor(self.class.super_class.clone(), vec![]);
            self.load_this()?;
            self.code
                .invoke_constructor(&super_constructor, self.class.this_type())?;
        }

        for statement in statements {
            self.translate_statement(statement)?;
        }

        // Falling off the end is only allowed for methods without a return value
        if self.code.is_reachable() {
            match &method.return_type {
                None => self.code.return_(None)?,
                Some(_) => {
                    let msg = format!("{} can complete without returning a value", method.name);
                    return Err(Error::UnsupportedNode(msg));
                }
            }
        }

        self.code.note_locals(self.locals.max_locals());
        Ok(self.code.result()?)
    }

    fn translate_statement(&mut self, statement: &Stmt) -> Result<(), Error> {
        match statement {
            Stmt::Expr(expr) => self.translate_effect(expr),

            Stmt::LocalDecl {
                local,
                local_type,
                initializer,
            } => {
                let slot = self.locals.declare(*local, local_type.clone())?;
                if let Some(initializer) = initializer {
                    self.translate_converted(initializer, local_type)?;
                    self.code.set_local(slot, local_type)?;
                }
                Ok(())
            }

            Stmt::Block(block) => self.translate_block(&block.0),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_label = self.code.fresh_label();
                self.translate_condition(condition, false, else_label)?;
                self.translate_block(std::slice::from_ref(then_branch.as_ref()))?;
                match else_branch {
                    None => self.code.place_label(else_label)?,
                    Some(else_branch) => {
                        let end_label = self.code.fresh_label();
                        self.code.push_branch(&opcode::GOTO, end_label)?;
                        self.code.place_label(else_label)?;
                        self.translate_block(std::slice::from_ref(else_branch.as_ref()))?;
                        self.code.place_label(end_label)?;
                    }
                }
                Ok(())
            }

            Stmt::While {
                label,
                condition,
                body,
            } => {
                let in_scope = self.locals.next_slot();
                let head = self.code.fresh_scoped_label(in_scope);
                let exit = self.code.fresh_scoped_label(in_scope);

                self.code.place_label(head)?;
                self.translate_condition(condition, false, exit)?;
                self.translate_loop_body(label, exit, head, body)?;
                self.code.push_branch(&opcode::GOTO, head)?;
                self.code.place_label(exit)?;
                Ok(())
            }

            Stmt::DoWhile {
                label,
                body,
                condition,
            } => {
                let in_scope = self.locals.next_slot();
                let head = self.code.fresh_scoped_label(in_scope);
                let next = self.code.fresh_scoped_label(in_scope);
                let exit = self.code.fresh_scoped_label(in_scope);

                self.code.place_label(head)?;
                self.translate_loop_body(label, exit, next, body)?;
                self.code.place_label(next)?;
                self.translate_condition(condition, true, head)?;
                self.code.place_label(exit)?;
                Ok(())
            }

            Stmt::For {
                label,
                init,
                condition,
                update,
                body,
            } => {
                self.locals.enter_block();
                for statement in init {
                    self.translate_statement(statement)?;
                }

                let in_scope = self.locals.next_slot();
                let head = self.code.fresh_scoped_label(in_scope);
                let next = self.code.fresh_scoped_label(in_scope);
                let exit = self.code.fresh_scoped_label(in_scope);

                self.code.place_label(head)?;
                if let Some(condition) = condition {
                    self.translate_condition(condition, false, exit)?;
                }
                self.translate_loop_body(label, exit, next, body)?;
                self.code.place_label(next)?;
                for expr in update {
                    self.translate_effect(expr)?;
                }
                self.code.push_branch(&opcode::GOTO, head)?;
                self.code.place_label(exit)?;

                let first_freed = self.locals.exit_block();
                self.code.kill_locals(first_freed);
                Ok(())
            }

            Stmt::Break(label) => {
                let target = self.enclosing_loop(label)?.break_label;
                Ok(self.code.push_branch(&opcode::GOTO, target)?)
            }

            Stmt::Continue(label) => {
                let target = self.enclosing_loop(label)?.continue_label;
                Ok(self.code.push_branch(&opcode::GOTO, target)?)
            }

            Stmt::Return(value) => {
                match (value, &self.method.return_type) {
                    (Some(value), Some(return_type)) => {
                        self.translate_converted(value, return_type)?
                    }
                    (Some(value), None) => return Err(unsupported(value)),
                    (None, _) => (),
                }
                Ok(self.code.return_(self.method.return_type.as_ref())?)
            }

            Stmt::ConstructorCall {
                constructor,
                arguments,
            } => {
                if !self.method.is_constructor() {
                    let msg = format!("constructor call in {}", self.method.name);
                    return Err(Error::UnsupportedNode(msg));
                }
                self.load_this()?;
                self.translate_arguments(arguments, &constructor.descriptor)?;
                Ok(self
                    .code
                    .invoke_constructor(constructor, self.class.this_type())?)
            }
        }
    }

    /// Translate statements in their own scope
    ///
    /// Locals declared inside the block go out of scope at its end, and their slots get reused.
    fn translate_block(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        self.locals.enter_block();
        for statement in statements {
            self.translate_statement(statement)?;
        }
        let first_freed = self.locals.exit_block();
        self.code.kill_locals(first_freed);
        Ok(())
    }

    fn translate_loop_body(
        &mut self,
        label: &Option<String>,
        break_label: Label,
        continue_label: Label,
        body: &Stmt,
    ) -> Result<(), Error> {
        self.loops.push(EnclosingLoop {
            label: label.clone(),
            break_label,
            continue_label,
        });
        let result = self.translate_block(std::slice::from_ref(body));
        self.loops.pop();
        result
    }

    fn enclosing_loop(&self, label: &Option<String>) -> Result<&EnclosingLoop, Error> {
        let found = match label {
            None => self.loops.last(),
            Some(name) => self
                .loops
                .iter()
                .rev()
                .find(|enclosing| enclosing.label.as_deref() == Some(name.as_str())),
        };
        found.ok_or_else(|| Error::MisplacedJump(label.clone()))
    }

    /// Translate an expression for its side effects only (nothing is left on the stack)
    fn translate_effect(&mut self, expr: &Expr) -> Result<(), Error> {
        match &expr.kind {
            ExprKind::Assign { target, value } => self.translate_assign(target, value, false),
            ExprKind::CompoundAssign { op, target, value } => {
                self.translate_compound_assign(*op, target, value, false)
            }
            ExprKind::Increment {
                target,
                decrement,
                prefix,
            } => self.translate_increment(target, *decrement, *prefix, false),
            _ => {
                self.translate_expression(expr)?;
                if expr.expr_type.is_some() {
                    self.code.simple(&opcode::POP)?;
                }
                Ok(())
            }
        }
    }

    /// Translate an expression, leaving its value on the stack
    fn translate_expression(&mut self, expr: &Expr) -> Result<(), Error> {
        match &expr.kind {
            ExprKind::Int(value) => self.code.const_int(*value)?,
            ExprKind::Float(value) => self.code.const_float(*value)?,
            ExprKind::Boolean(value) => self.code.const_int(i32::from(*value))?,
            ExprKind::String(value) => self.code.const_string(value)?,
            ExprKind::Null => self.code.simple(&opcode::ACONST_NULL)?,

            ExprKind::This => self.load_this()?,
            ExprKind::Local(local) => {
                let (slot, local_type) = self.locals.lookup(*local)?;
                self.code.get_local(slot, local_type)?;
            }
            ExprKind::StaticField(field) => self.code.get_field(field)?,
            ExprKind::Field { object, field } => {
                self.translate_expression(object)?;
                self.code.get_field(field)?;
            }
            ExprKind::ArrayElement { array, index } => {
                self.translate_expression(array)?;
                self.translate_expression(index)?;
                self.code.array_load(field_type(expr)?)?;
            }
            ExprKind::ArrayLength(array) => {
                self.translate_expression(array)?;
                self.code.simple(&opcode::ARRAYLENGTH)?;
            }

            ExprKind::Assign { target, value } => self.translate_assign(target, value, true)?,
            ExprKind::CompoundAssign { op, target, value } => {
                self.translate_compound_assign(*op, target, value, true)?
            }
            ExprKind::Increment {
                target,
                decrement,
                prefix,
            } => self.translate_increment(target, *decrement, *prefix, true)?,

            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Negate => {
                    self.translate_expression(operand)?;
                    match value_kind(field_type(operand)?) {
                        ValueKind::Int => self.code.simple(&opcode::INEG)?,
                        ValueKind::Float => self.code.simple(&opcode::FNEG)?,
                        ValueKind::Reference => return Err(unsupported(expr)),
                    }
                }
                UnaryOp::BitNot => {
                    self.translate_expression(operand)?;
                    self.code.const_int(-1)?;
                    self.code.simple(&opcode::IXOR)?;
                }
                UnaryOp::Not => self.translate_boolean_value(expr)?,
            },

            ExprKind::Binary { op, left, right } => {
                if *op == BinaryOp::Add && is_string(field_type(expr)?) {
                    self.translate_concatenation(expr)?;
                } else {
                    let operation_type = field_type(expr)?;
                    self.translate_converted(left, operation_type)?;
                    self.translate_converted(right, operation_type)?;
                    let opcode = binary_opcode(*op, value_kind(operation_type))
                        .ok_or_else(|| unsupported(expr))?;
                    self.code.simple(opcode)?;
                }
            }

            ExprKind::Compare { .. } | ExprKind::Logical { .. } => {
                self.translate_boolean_value(expr)?
            }

            ExprKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                let result_type = field_type(expr)?;
                let else_label = self.code.fresh_label();
                let end_label = self.code.fresh_label();

                self.translate_condition(condition, false, else_label)?;
                self.translate_converted(then_value, result_type)?;
                self.generalize_top(result_type)?;
                self.code.push_branch(&opcode::GOTO, end_label)?;
                self.code.place_label(else_label)?;
                self.translate_converted(else_value, result_type)?;
                self.generalize_top(result_type)?;
                self.code.place_label(end_label)?;
            }

            ExprKind::Call {
                receiver,
                method,
                arguments,
                via_super,
            } => {
                match receiver {
                    Some(receiver) => {
                        self.translate_expression(receiver)?;
                        if method.is_static {
                            self.code.simple(&opcode::POP)?;
                        }
                    }
                    None if !method.is_static => self.load_this()?,
                    None => (),
                }
                self.translate_arguments(arguments, &method.descriptor)?;
                self.code.invoke(method, *via_super)?;
            }

            ExprKind::New {
                constructor,
                arguments,
            } => {
                let class = RefType::Object(constructor.class.clone());
                self.code.new_object(&class)?;
                self.code.simple(&opcode::DUP)?;
                self.translate_arguments(arguments, &constructor.descriptor)?;
                self.code.invoke_constructor(constructor, class)?;
            }

            ExprKind::NewArray { dimensions } => {
                let array_type = array_type(expr)?;
                if dimensions.is_empty() || dimensions.len() > array_type.dimensions() {
                    return Err(unsupported(expr));
                }
                for dimension in dimensions {
                    self.translate_expression(dimension)?;
                }
                self.code.new_array(array_type, dimensions.len())?;
            }

            ExprKind::ArrayInit(elements) => {
                let array_type = array_type(expr)?;
                let element_type = array_type
                    .component_type()
                    .ok_or_else(|| unsupported(expr))?;
                let length = i32::try_from(elements.len()).map_err(|_| unsupported(expr))?;

                self.code.const_int(length)?;
                self.code.new_array(array_type, 1)?;
                for (index, element) in (0..length).zip(elements) {
                    self.code.simple(&opcode::DUP)?;
                    self.code.const_int(index)?;
                    self.translate_converted(element, &element_type)?;
                    self.code.array_store(&element_type)?;
                }
            }

            ExprKind::Cast(operand) => {
                let from_type = field_type(operand)?;
                let to_type = field_type(expr)?;
                self.translate_expression(operand)?;
                match (value_kind(from_type), to_type) {
                    (ValueKind::Int, FieldType::Base(BaseType::Float)) => {
                        self.code.simple(&opcode::I2F)?
                    }
                    (ValueKind::Float, FieldType::Base(BaseType::Int)) => {
                        self.code.simple(&opcode::F2I)?
                    }
                    (ValueKind::Reference, FieldType::Ref(to_ref_type)) => {
                        if from_type != to_type {
                            self.code.checkcast(to_ref_type)?;
                        }
                    }
                    _ if from_type == to_type => (),
                    _ => return Err(unsupported(expr)),
                }
            }

            ExprKind::InstanceOf { operand, class } => {
                self.translate_expression(operand)?;
                self.code.instanceof(class)?;
            }
        }
        Ok(())
    }

    /// Translate an expression whose value is used where `expected_type` is
    ///
    /// An `int` value used as a `float` gets widened with `i2f`.
    fn translate_converted(
        &mut self,
        expr: &Expr,
        expected_type: &FieldType,
    ) -> Result<(), Error> {
        self.translate_expression(expr)?;
        let widen = value_kind(field_type(expr)?) == ValueKind::Int
            && value_kind(expected_type) == ValueKind::Float;
        if widen {
            self.code.simple(&opcode::I2F)?;
        }
        Ok(())
    }

    fn translate_arguments(
        &mut self,
        arguments: &[Expr],
        descriptor: &MethodDescriptor,
    ) -> Result<(), Error> {
        if arguments.len() != descriptor.parameters.len() {
            let msg = format!("{} arguments for {:?}", arguments.len(), descriptor);
            return Err(Error::UnsupportedNode(msg));
        }
        for (argument, parameter) in arguments.iter().zip(&descriptor.parameters) {
            self.translate_converted(argument, parameter)?;
        }
        Ok(())
    }

    /// Jump to `target` if the condition evaluates to `jump_if`, otherwise fall through
    fn translate_condition(
        &mut self,
        condition: &Expr,
        jump_if: bool,
        target: Label,
    ) -> Result<(), Error> {
        match &condition.kind {
            ExprKind::Boolean(value) => {
                if *value == jump_if {
                    self.code.push_branch(&opcode::GOTO, target)?;
                }
            }

            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.translate_condition(operand, !jump_if, target)?,

            ExprKind::Logical { op, left, right } => match (op, jump_if) {
                // Either operand alone decides the outcome
                (LogicalOp::And, false) | (LogicalOp::Or, true) => {
                    self.translate_condition(left, jump_if, target)?;
                    self.translate_condition(right, jump_if, target)?;
                }

                // Both operands are needed to decide the outcome
                (LogicalOp::And, true) | (LogicalOp::Or, false) => {
                    let skip = self.code.fresh_label();
                    self.translate_condition(left, !jump_if, skip)?;
                    self.translate_condition(right, jump_if, target)?;
                    self.code.place_label(skip)?;
                }
            },

            ExprKind::Compare { op, left, right } => {
                let opcode = self.translate_comparison(condition, *op, left, right)?;
                let opcode = if jump_if {
                    opcode
                } else {
                    negate_branch(opcode).ok_or_else(|| unsupported(condition))?
                };
                self.code.push_branch(opcode, target)?;
            }

            _ => {
                self.translate_expression(condition)?;
                let opcode = if jump_if {
                    &opcode::IFNE
                } else {
                    &opcode::IFEQ
                };
                self.code.push_branch(opcode, target)?;
            }
        }
        Ok(())
    }

    /// Push the operands of a comparison, returning the branch taken when the comparison holds
    fn translate_comparison(
        &mut self,
        comparison: &Expr,
        op: CompareOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<&'static Opcode, Error> {
        let kind = match (value_kind(field_type(left)?), value_kind(field_type(right)?)) {
            (ValueKind::Float, _) | (_, ValueKind::Float) => ValueKind::Float,
            (kind, _) => kind,
        };
        let opcode = match kind {
            ValueKind::Int if is_zero(right) => {
                self.translate_expression(left)?;
                zero_branch(op)
            }
            ValueKind::Int => {
                self.translate_expression(left)?;
                self.translate_expression(right)?;
                match op {
                    CompareOp::Eq => &opcode::IF_ICMPEQ,
                    CompareOp::Ne => &opcode::IF_ICMPNE,
                    CompareOp::Lt => &opcode::IF_ICMPLT,
                    CompareOp::Le => &opcode::IF_ICMPLE,
                    CompareOp::Gt => &opcode::IF_ICMPGT,
                    CompareOp::Ge => &opcode::IF_ICMPGE,
                }
            }

            // `fcmpg` and `fcmpl` differ on NaN, which must make `<`, `<=`, `>`, `>=` false
            ValueKind::Float => {
                let float = FieldType::float();
                self.translate_converted(left, &float)?;
                self.translate_converted(right, &float)?;
                let compare = match op {
                    CompareOp::Lt | CompareOp::Le => &opcode::FCMPG,
                    _ => &opcode::FCMPL,
                };
                self.code.simple(compare)?;
                zero_branch(op)
            }

            ValueKind::Reference => {
                let null_check = match (&left.kind, &right.kind) {
                    (_, ExprKind::Null) => Some(left),
                    (ExprKind::Null, _) => Some(right),
                    _ => None,
                };
                match (op, null_check) {
                    (CompareOp::Eq, Some(operand)) => {
                        self.translate_expression(operand)?;
                        &opcode::IFNULL
                    }
                    (CompareOp::Ne, Some(operand)) => {
                        self.translate_expression(operand)?;
                        &opcode::IFNONNULL
                    }
                    (CompareOp::Eq, None) => {
                        self.translate_expression(left)?;
                        self.translate_expression(right)?;
                        &opcode::IF_ACMPEQ
                    }
                    (CompareOp::Ne, None) => {
                        self.translate_expression(left)?;
                        self.translate_expression(right)?;
                        &opcode::IF_ACMPNE
                    }
                    _ => return Err(unsupported(comparison)),
                }
            }
        };
        Ok(opcode)
    }

    /// Materialize a condition as `0` or `1` on the stack
    fn translate_boolean_value(&mut self, condition: &Expr) -> Result<(), Error> {
        let false_label = self.code.fresh_label();
        let end_label = self.code.fresh_label();
        self.translate_condition(condition, false, false_label)?;
        self.code.const_int(1)?;
        self.code.push_branch(&opcode::GOTO, end_label)?;
        self.code.place_label(false_label)?;
        self.code.const_int(0)?;
        self.code.place_label(end_label)?;
        Ok(())
    }

    /// `target = value`, with the assigned value left on the stack if `keep_value`
    fn translate_assign(&mut self, target: &Expr, value: &Expr, keep_value: bool) -> Result<(), Error> {
        let target_type = field_type(target)?;
        match &target.kind {
            ExprKind::Local(local) => {
                self.translate_converted(value, target_type)?;
                if keep_value {
                    self.code.simple(&opcode::DUP)?;
                }
                let (slot, local_type) = self.locals.lookup(*local)?;
                self.code.set_local(slot, local_type)?;
            }
            ExprKind::StaticField(field) => {
                self.translate_converted(value, target_type)?;
                if keep_value {
                    self.code.simple(&opcode::DUP)?;
                }
                self.code.put_field(field)?;
            }
            ExprKind::Field { object, field } => {
                self.translate_expression(object)?;
                self.translate_converted(value, target_type)?;
                if keep_value {
                    self.code.simple(&opcode::DUP_X1)?;
                }
                self.code.put_field(field)?;
            }
            ExprKind::ArrayElement { array, index } => {
                self.translate_expression(array)?;
                self.translate_expression(index)?;
                self.translate_converted(value, target_type)?;
                if keep_value {
                    self.code.simple(&opcode::DUP_X2)?;
                }
                self.code.array_store(target_type)?;
            }
            _ => return Err(unsupported(target)),
        }
        Ok(())
    }

    /// `target op= value`, with the assigned value left on the stack if `keep_value`
    fn translate_compound_assign(
        &mut self,
        op: BinaryOp,
        target: &Expr,
        value: &Expr,
        keep_value: bool,
    ) -> Result<(), Error> {
        let target_type = field_type(target)?;
        let value_type = field_type(value)?;

        // `iinc` covers adding small constants to `int` locals
        if let ExprKind::Local(local) = &target.kind {
            if !keep_value && *target_type == FieldType::int() {
                if let Some(delta) = increment_constant(op, value) {
                    let (slot, _) = self.locals.lookup(*local)?;
                    let instruction = Instruction::increment(slot, delta);
                    return Ok(self.code.push_instruction(instruction, OperandTypes::None)?);
                }
            }
        }

        let keep = self.load_for_update(target)?;
        if op == BinaryOp::Add && is_string(target_type) {
            self.wrap_in_string_builder(target_type)?;
            self.translate_expression(value)?;
            self.append_to_string_builder(value_type)?;
            self.string_builder_to_string()?;
        } else {
            // Mixed `int`/`float` arithmetic happens in `float`, then narrows back
            let widen = *target_type == FieldType::int()
                && *value_type == FieldType::float()
                && !matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr);
            if widen {
                self.code.simple(&opcode::I2F)?;
            }
            let operation_type = if widen { value_type } else { target_type };
            self.translate_converted(value, operation_type)?;
            let opcode = binary_opcode(op, value_kind(operation_type))
                .ok_or_else(|| unsupported(target))?;
            self.code.simple(opcode)?;
            if widen {
                self.code.simple(&opcode::F2I)?;
            }
        }
        if keep_value {
            self.code.simple(keep)?;
        }
        self.store_after_update(target)
    }

    /// `++target`, `target++`, `--target`, or `target--`
    fn translate_increment(
        &mut self,
        target: &Expr,
        decrement: bool,
        prefix: bool,
        keep_value: bool,
    ) -> Result<(), Error> {
        let target_type = field_type(target)?;

        if let ExprKind::Local(local) = &target.kind {
            if *target_type == FieldType::int() {
                let (slot, _) = self.locals.lookup(*local)?;
                let delta = if decrement { -1 } else { 1 };
                if keep_value && !prefix {
                    self.code.get_local(slot, target_type)?;
                }
                self.code
                    .push_instruction(Instruction::increment(slot, delta), OperandTypes::None)?;
                if keep_value && prefix {
                    self.code.get_local(slot, target_type)?;
                }
                return Ok(());
            }
        }

        let keep = self.load_for_update(target)?;
        if keep_value && !prefix {
            self.code.simple(keep)?;
        }
        let kind = value_kind(target_type);
        match kind {
            ValueKind::Int => self.code.const_int(1)?,
            ValueKind::Float => self.code.const_float(1.0)?,
            ValueKind::Reference => return Err(unsupported(target)),
        }
        let op = if decrement { BinaryOp::Sub } else { BinaryOp::Add };
        let opcode = binary_opcode(op, kind).ok_or_else(|| unsupported(target))?;
        self.code.simple(opcode)?;
        if keep_value && prefix {
            self.code.simple(keep)?;
        }
        self.store_after_update(target)
    }

    /// Push the "address" of an assignable expression (duplicated), followed by its current value
    ///
    /// Returns the instruction which copies a value on the top of the stack to below the address,
    /// so that it survives the store.
    fn load_for_update(&mut self, target: &Expr) -> Result<&'static Opcode, Error> {
        let keep = match &target.kind {
            ExprKind::Local(local) => {
                let (slot, local_type) = self.locals.lookup(*local)?;
                self.code.get_local(slot, local_type)?;
                &opcode::DUP
            }
            ExprKind::StaticField(field) => {
                self.code.get_field(field)?;
                &opcode::DUP
            }
            ExprKind::Field { object, field } => {
                self.translate_expression(object)?;
                self.code.simple(&opcode::DUP)?;
                self.code.get_field(field)?;
                &opcode::DUP_X1
            }
            ExprKind::ArrayElement { array, index } => {
                self.translate_expression(array)?;
                self.translate_expression(index)?;
                self.code.simple(&opcode::DUP2)?;
                self.code.array_load(field_type(target)?)?;
                &opcode::DUP_X2
            }
            _ => return Err(unsupported(target)),
        };
        Ok(keep)
    }

    /// Store the updated value back, consuming the address pushed by [`Self::load_for_update`]
    fn store_after_update(&mut self, target: &Expr) -> Result<(), Error> {
        match &target.kind {
            ExprKind::Local(local) => {
                let (slot, local_type) = self.locals.lookup(*local)?;
                self.code.set_local(slot, local_type)?;
            }
            ExprKind::StaticField(field) | ExprKind::Field { field, .. } => {
                self.code.put_field(field)?;
            }
            ExprKind::ArrayElement { .. } => self.code.array_store(field_type(target)?)?,
            _ => return Err(unsupported(target)),
        }
        Ok(())
    }

    /// String concatenation through `java/lang/StringBuilder`
    ///
    /// Chains of `+` are flattened so that they share one builder.
    fn translate_concatenation(&mut self, expr: &Expr) -> Result<(), Error> {
        let mut operands = vec![];
        concatenation_operands(expr, &mut operands);

        let string_builder = RefType::Object(BinaryName::STRINGBUILDER);
        let constructor = MethodRef::constructor(BinaryName::STRINGBUILDER, vec![]);
        self.code.new_object(&string_builder)?;
        self.code.simple(&opcode::DUP)?;
        self.code.invoke_constructor(&constructor, string_builder)?;
        for operand in operands {
            self.translate_expression(operand)?;
            self.append_to_string_builder(field_type(operand)?)?;
        }
        self.string_builder_to_string()
    }

    /// Replace the value on top of the stack with a fresh builder that has the value appended
    fn wrap_in_string_builder(&mut self, value_type: &FieldType) -> Result<(), Error> {
        let string_builder = RefType::Object(BinaryName::STRINGBUILDER);
        let constructor = MethodRef::constructor(BinaryName::STRINGBUILDER, vec![]);
        self.code.new_object(&string_builder)?;
        self.code.simple(&opcode::DUP)?;
        self.code.invoke_constructor(&constructor, string_builder)?;
        self.code.simple(&opcode::SWAP)?;
        self.append_to_string_builder(value_type)
    }

    fn append_to_string_builder(&mut self, value_type: &FieldType) -> Result<(), Error> {
        let parameter = match value_type {
            FieldType::Base(_) => value_type.clone(),
            _ if is_string(value_type) => FieldType::string(),
            _ => FieldType::object(BinaryName::OBJECT),
        };
        let append = MethodRef::virtual_method(
            BinaryName::STRINGBUILDER,
            UnqualifiedName::APPEND,
            MethodDescriptor {
                parameters: vec![parameter],
                return_type: Some(FieldType::object(BinaryName::STRINGBUILDER)),
            },
        );
        Ok(self.code.invoke(&append, false)?)
    }

    fn string_builder_to_string(&mut self) -> Result<(), Error> {
        let to_string = MethodRef::virtual_method(
            BinaryName::STRINGBUILDER,
            UnqualifiedName::TOSTRING,
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::string()),
            },
        );
        Ok(self.code.invoke(&to_string, false)?)
    }

    fn load_this(&mut self) -> Result<(), Error> {
        if self.method.is_static() {
            let msg = format!("`this` in static method {}", self.method.name);
            return Err(Error::UnsupportedNode(msg));
        }
        let this_type = FieldType::Ref(self.class.this_type());
        Ok(self.code.get_local(0, &this_type)?)
    }

    /// Widen the type on top of the stack to the static type of an expression
    ///
    /// Needed where branches join with different reference types (eg. `null` and a `String`).
    fn generalize_top(&mut self, expr_type: &FieldType) -> Result<(), Error> {
        if expr_type.is_reference() {
            let general_type = VerifierType::from(expr_type.clone());
            self.code.generalize_top_stack_type(general_type)?;
        }
        Ok(())
    }
}

fn unsupported(expr: &Expr) -> Error {
    Error::UnsupportedNode(format!("{:?}", expr))
}

/// Static type of an expression which must have a value
fn field_type(expr: &Expr) -> Result<&FieldType, Error> {
    expr.expr_type.as_ref().ok_or_else(|| unsupported(expr))
}

/// Static type of an expression which must be an array
fn array_type(expr: &Expr) -> Result<&RefType, Error> {
    match &expr.expr_type {
        Some(FieldType::Ref(ref_type)) if ref_type.dimensions() > 0 => Ok(ref_type),
        _ => Err(unsupported(expr)),
    }
}

fn is_string(field_type: &FieldType) -> bool {
    *field_type == FieldType::string()
}

fn is_zero(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Int(0) | ExprKind::Boolean(false))
}

/// Delta for `iinc`, if `local op= value` can use it
fn increment_constant(op: BinaryOp, value: &Expr) -> Option<i16> {
    let constant = match value.kind {
        ExprKind::Int(constant) => constant,
        _ => return None,
    };
    let delta = match op {
        BinaryOp::Add => constant,
        BinaryOp::Sub => constant.checked_neg()?,
        _ => return None,
    };
    i16::try_from(delta).ok()
}

/// Collect the operands of a chain of string `+`, left to right
fn concatenation_operands<'e>(expr: &'e Expr, operands: &mut Vec<&'e Expr>) {
    match &expr.kind {
        ExprKind::Binary {
            op: BinaryOp::Add,
            left,
            right,
        } if expr.expr_type.as_ref().map_or(false, is_string) => {
            concatenation_operands(left, operands);
            operands.push(right);
        }
        _ => operands.push(expr),
    }
}

/// Branch comparing the `int` on top of the stack against zero
fn zero_branch(op: CompareOp) -> &'static Opcode {
    match op {
        CompareOp::Eq => &opcode::IFEQ,
        CompareOp::Ne => &opcode::IFNE,
        CompareOp::Lt => &opcode::IFLT,
        CompareOp::Le => &opcode::IFLE,
        CompareOp::Gt => &opcode::IFGT,
        CompareOp::Ge => &opcode::IFGE,
    }
}

fn binary_opcode(op: BinaryOp, kind: ValueKind) -> Option<&'static Opcode> {
    let opcode = match (op, kind) {
        (BinaryOp::Add, ValueKind::Int) => &opcode::IADD,
        (BinaryOp::Sub, ValueKind::Int) => &opcode::ISUB,
        (BinaryOp::Mul, ValueKind::Int) => &opcode::IMUL,
        (BinaryOp::Div, ValueKind::Int) => &opcode::IDIV,
        (BinaryOp::Rem, ValueKind::Int) => &opcode::IREM,
        (BinaryOp::BitAnd, ValueKind::Int) => &opcode::IAND,
        (BinaryOp::BitOr, ValueKind::Int) => &opcode::IOR,
        (BinaryOp::BitXor, ValueKind::Int) => &opcode::IXOR,
        (BinaryOp::Shl, ValueKind::Int) => &opcode::ISHL,
        (BinaryOp::Shr, ValueKind::Int) => &opcode::ISHR,
        (BinaryOp::UShr, ValueKind::Int) => &opcode::IUSHR,
        (BinaryOp::Add, ValueKind::Float) => &opcode::FADD,
        (BinaryOp::Sub, ValueKind::Float) => &opcode::FSUB,
        (BinaryOp::Mul, ValueKind::Float) => &opcode::FMUL,
        (BinaryOp::Div, ValueKind::Float) => &opcode::FDIV,
        (BinaryOp::Rem, ValueKind::Float) => &opcode::FREM,
        _ => return None,
    };
    Some(opcode)
}
